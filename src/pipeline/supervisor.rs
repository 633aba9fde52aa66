//! Download-completion supervisor: moves finished transfers out of the download registry.

use super::PipelineManager;
use crate::engine::DownloadOutcome;
use crate::types::{Event, Stage};
use std::time::Duration;

/// Lower bound on the timed fallback wake-up
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl PipelineManager {
    /// Start the download supervisor task
    ///
    /// The loop sleeps until the engine reports a finished transfer (or the
    /// configured poll interval elapses), then reaps every transfer that has an
    /// outcome. It stops when the lifecycle token is cancelled.
    pub(crate) fn start_download_supervisor(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let poll = manager
            .config
            .download
            .supervisor_poll_interval
            .max(MIN_POLL_INTERVAL);

        tokio::spawn(async move {
            tracing::debug!(poll_ms = poll.as_millis() as u64, "Download supervisor started");
            loop {
                manager.reap_finished_downloads().await;

                tokio::select! {
                    _ = manager.lifecycle.cancel.cancelled() => break,
                    _ = manager.signals.download_done.notified() => {}
                    _ = tokio::time::sleep(poll) => {}
                }
            }
            tracing::debug!("Download supervisor stopped");
        })
    }

    /// One supervision pass over the download registry
    ///
    /// Each finished task is removed and pushed onto its target registry under
    /// the same lock acquisition. Local files are removed and events emitted
    /// after the lock is released.
    pub(crate) async fn reap_finished_downloads(&self) {
        let mut events = Vec::new();
        let mut to_delete = Vec::new();
        let mut queued_for_upload = false;

        {
            let mut guard = self.registries.lock().await;
            let registries = &mut *guard;
            let mut index = 0;

            while index < registries.downloads.len() {
                let Some(outcome) = registries.downloads[index].transfer.outcome() else {
                    index += 1;
                    continue;
                };

                let mut entry = registries.downloads.remove(index);
                entry.refresh_progress();
                let mut task = entry.task;
                let id = task.id;

                match outcome {
                    DownloadOutcome::Succeeded if task.upload => {
                        task.set_stage(Stage::AwaitingUpload);
                        tracing::info!(task_id = %id, name = %task.name, "Download finished, queued for upload");
                        registries.uploads.push_back(task);
                        queued_for_upload = true;
                        events.push(Event::DownloadFinished {
                            id,
                            queued_for_upload: true,
                        });
                    }
                    DownloadOutcome::Succeeded => {
                        task.set_stage(Stage::Completed);
                        tracing::info!(task_id = %id, name = %task.name, "Download finished");
                        if task.delete {
                            registries.releasing.push(task.destination.clone());
                            to_delete.push(task.destination.clone());
                        }
                        registries.push_completed(task, self.config.retention.max_completed);
                        events.push(Event::DownloadFinished {
                            id,
                            queued_for_upload: false,
                        });
                        events.push(Event::Completed { id });
                    }
                    DownloadOutcome::Failed(reason) => {
                        task.record_error(format!("download failed: {}", reason));
                        task.set_stage(Stage::DownloadFailed);
                        tracing::error!(task_id = %id, name = %task.name, error = %reason, "Download failed");
                        registries.push_error(task, self.config.retention.max_errors);
                        events.push(Event::DownloadFailed { id, error: reason });
                    }
                }
            }
        }

        for path in to_delete {
            self.release_local_file(path).await;
        }
        if queued_for_upload {
            self.signals.upload_ready.notify_one();
        }
        for event in events {
            self.emit_event(event);
        }
    }
}
