//! Upload driver: serves the upload registry one task at a time.
//!
//! Per task the driver opens a resumable session, pulls it forward chunk by
//! chunk and reacts to failures by class:
//!
//! | Class | Action |
//! |---|---|
//! | `SessionExpired` | consume a retry, open a fresh session, progress resets |
//! | `TransientServer` | consume a retry, back off, resume the same session |
//! | stalled (`308` with no new bytes) | treated as `TransientServer` |
//! | `Fatal` | fail the task |
//!
//! A retryable failure with no retries left fails the task with
//! [`UploadError::RetriesExhausted`].

use super::PipelineManager;
use crate::error::{AuthError, UploadError};
use crate::retry::{Classify, FailureClass, RetryBudget, backoff_delay};
use crate::storage::{ChunkOutcome, UploadSession, UploadSource, content_type_for};
use crate::types::{Event, Stage, TaskId, UploadProgress};
use std::path::PathBuf;
use std::time::Instant;

/// What the driver needs to know about the task it claimed
#[derive(Clone, Debug)]
struct UploadJob {
    id: TaskId,
    name: String,
    path: PathBuf,
    delete: bool,
}

impl PipelineManager {
    /// Start the upload driver task
    ///
    /// Waits for authorization, then serves the upload registry head-first.
    /// Sleeps on the `upload_ready` notification while the registry is empty.
    pub(crate) fn start_upload_driver(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();

        tokio::spawn(async move {
            let cancel = manager.lifecycle.cancel.clone();
            loop {
                if !manager.authorizer.is_authorized() {
                    tracing::info!("Upload driver waiting for authorization");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = manager.authorizer.wait_until_authorized() => {}
                    }
                }

                let Some(job) = manager.claim_next_upload().await else {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = manager.signals.upload_ready.notified() => {}
                    }
                    continue;
                };

                let result = manager.drive_upload(&job).await;
                manager.finish_upload(job, result).await;

                if cancel.is_cancelled() {
                    break;
                }
            }
            tracing::debug!("Upload driver stopped");
        })
    }

    /// Mark the head of the upload registry as `Uploading` and describe it
    async fn claim_next_upload(&self) -> Option<UploadJob> {
        let job = {
            let mut registries = self.registries.lock().await;
            let task = registries.uploads.front_mut()?;
            if task.stage != Stage::AwaitingUpload {
                return None;
            }
            task.set_stage(Stage::Uploading);
            task.upload_progress = None;
            UploadJob {
                id: task.id,
                name: task.name.clone(),
                path: task.destination.clone(),
                delete: task.delete,
            }
        };

        tracing::info!(task_id = %job.id, name = %job.name, "Upload started");
        self.emit_event(Event::UploadStarted { id: job.id });
        Some(job)
    }

    /// Run the resumable upload state machine until success or a terminal failure
    async fn drive_upload(&self, job: &UploadJob) -> Result<(), UploadError> {
        let cancel = self.lifecycle.cancel.clone();
        let size = tokio::fs::metadata(&job.path).await?.len();
        let source = UploadSource {
            path: job.path.clone(),
            name: job.name.clone(),
            size,
            chunk_size: self.config.upload.chunk_size_bytes(),
            mime_type: content_type_for(&job.name),
        };

        let mut budget = RetryBudget::new(self.config.upload.max_retries);
        let mut session: Option<Box<dyn UploadSession>> = None;
        let mut acknowledged = 0u64;

        loop {
            let failure = if let Some(active) = session.as_mut() {
                let started = Instant::now();
                let result = tokio::select! {
                    _ = cancel.cancelled() => None,
                    result = active.next_chunk() => Some(result),
                };
                let Some(result) = result else {
                    active.abort().await;
                    return Err(UploadError::Aborted);
                };

                match result {
                    Ok(ChunkOutcome::Done) => {
                        self.record_upload_progress(
                            job.id,
                            size,
                            size,
                            acknowledged,
                            started,
                            &budget,
                        )
                        .await;
                        return Ok(());
                    }
                    // A 308 that acknowledges nothing new would otherwise spin forever
                    Ok(ChunkOutcome::InProgress(progress))
                        if progress.sent_bytes <= acknowledged =>
                    {
                        UploadError::TransientServer {
                            status: 308,
                            message: format!("no progress past byte {} acknowledged", acknowledged),
                        }
                    }
                    Ok(ChunkOutcome::InProgress(progress)) => {
                        self.record_upload_progress(
                            job.id,
                            progress.sent_bytes,
                            progress.total_bytes,
                            acknowledged,
                            started,
                            &budget,
                        )
                        .await;
                        acknowledged = progress.sent_bytes;
                        continue;
                    }
                    Err(e) => e,
                }
            } else {
                let opened = tokio::select! {
                    _ = cancel.cancelled() => return Err(UploadError::Aborted),
                    opened = self.open_session(&source) => opened,
                };
                match opened {
                    Ok(opened) => {
                        session = Some(opened);
                        continue;
                    }
                    Err(e) => e,
                }
            };

            let class = failure.failure_class();
            if !class.is_retryable() {
                return Err(failure);
            }
            if !budget.try_consume() {
                return Err(UploadError::RetriesExhausted {
                    attempts: budget.used(),
                    last: Box::new(failure),
                });
            }

            let attempt = budget.used();
            let new_session = class == FailureClass::SessionExpired;
            tracing::warn!(
                task_id = %job.id,
                attempt,
                max = budget.max(),
                remaining = budget.remaining(),
                new_session,
                error = %failure,
                "Retryable upload failure"
            );
            self.note_retry(job.id, attempt, budget.max(), new_session).await;

            if new_session {
                session = None;
                acknowledged = 0;
            } else {
                let delay = backoff_delay(&self.config.retry, attempt);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Some(active) = session.as_mut() {
                            active.abort().await;
                        }
                        return Err(UploadError::Aborted);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Open a session with a current access token
    async fn open_session(
        &self,
        source: &UploadSource,
    ) -> Result<Box<dyn UploadSession>, UploadError> {
        let token = self.authorizer.access_token().await.map_err(|e| match e {
            AuthError::Network(message) => UploadError::Network {
                message,
                retryable: true,
            },
            other => UploadError::NotAuthorized(other.to_string()),
        })?;
        self.storage.create_session(&token, source).await
    }

    async fn record_upload_progress(
        &self,
        id: TaskId,
        sent_bytes: u64,
        total_bytes: u64,
        previously_acknowledged: u64,
        started: Instant,
        budget: &RetryBudget,
    ) {
        let elapsed = started.elapsed().as_secs_f64();
        let delta = sent_bytes.saturating_sub(previously_acknowledged);
        let speed_bps = if elapsed > 0.0 {
            delta as f64 / elapsed
        } else {
            0.0
        };

        {
            let mut registries = self.registries.lock().await;
            if let Some(task) = registries.upload_mut(id) {
                task.upload_progress = Some(UploadProgress {
                    sent_bytes,
                    total_bytes,
                    speed_bps,
                    retries: budget.used(),
                });
            }
        }

        tracing::debug!(task_id = %id, sent_bytes, total_bytes, "Chunk acknowledged");
        self.emit_event(Event::UploadProgress {
            id,
            sent_bytes,
            total_bytes,
        });
    }

    async fn note_retry(&self, id: TaskId, attempt: u32, max: u32, new_session: bool) {
        {
            let mut registries = self.registries.lock().await;
            if let Some(task) = registries.upload_mut(id) {
                task.retry_note = Some(format!("retrying, attempt {} of {}", attempt, max));
                if new_session {
                    task.upload_progress = None;
                } else if let Some(progress) = task.upload_progress.as_mut() {
                    progress.retries = attempt;
                }
            }
        }
        self.emit_event(Event::UploadRetrying {
            id,
            attempt,
            max,
            new_session,
        });
    }

    /// Move the task out of the upload registry to its terminal registry
    async fn finish_upload(&self, job: UploadJob, result: Result<(), UploadError>) {
        {
            let mut registries = self.registries.lock().await;
            let Some(mut task) = registries.take_upload(job.id) else {
                tracing::error!(task_id = %job.id, "Uploaded task vanished from the upload registry");
                return;
            };
            match &result {
                Ok(()) => {
                    task.set_stage(Stage::Completed);
                    if job.delete {
                        registries.releasing.push(job.path.clone());
                    }
                    registries.push_completed(task, self.config.retention.max_completed);
                }
                Err(e) => {
                    task.record_error(e);
                    task.set_stage(Stage::Failed);
                    registries.push_error(task, self.config.retention.max_errors);
                }
            }
        }

        match result {
            Ok(()) => {
                tracing::info!(task_id = %job.id, name = %job.name, "Upload completed");
                if job.delete {
                    self.release_local_file(job.path.clone()).await;
                }
                self.emit_event(Event::Completed { id: job.id });
            }
            Err(e) => {
                tracing::error!(task_id = %job.id, name = %job.name, error = %e, "Upload failed");
                self.emit_event(Event::Failed {
                    id: job.id,
                    error: e.to_string(),
                });
            }
        }
    }
}
