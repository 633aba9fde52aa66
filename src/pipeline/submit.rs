//! Task submission

use super::PipelineManager;
use super::task::{DownloadEntry, Task};
use crate::engine::DownloadRequest;
use crate::error::{Error, Result};
use crate::types::{Event, Stage, SubmitOptions, TaskHandle};
use std::sync::atomic::Ordering;

impl PipelineManager {
    /// Submit a URL to be downloaded into `name` under the download directory
    ///
    /// The download starts immediately. If the engine refuses the request
    /// (malformed URL, unsupported scheme, bad host, unusable destination
    /// directory) the task goes straight to the error registry with the reason
    /// recorded, and this call still returns `Ok`; callers learn about start-up failures from [`status`](Self::status)
    /// or [`task`](Self::task).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty URL, an empty name, a name
    ///   that is not a plain file name, or a name whose file still belongs to
    ///   an unfinished task
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub async fn submit(&self, url: &str, name: &str, options: SubmitOptions) -> Result<TaskHandle> {
        if !self.lifecycle.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidArgument("URL must not be empty".to_string()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("name must not be empty".to_string()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::InvalidArgument(format!(
                "name '{}' must be a plain file name",
                name
            )));
        }

        let destination = self.config.download_dir().join(name);
        let mut task = Task::new(url, destination, name, options);
        let handle = task.handle();
        let request = DownloadRequest {
            id: task.id,
            url: task.source_url.clone(),
            destination: task.destination.clone(),
        };

        // Start under the lock so the supervisor cannot miss this transfer's completion
        let mut registries = self.registries.lock().await;
        if registries.holds_destination(&task.destination) {
            return Err(Error::InvalidArgument(format!(
                "'{}' is still in use by another task",
                name
            )));
        }
        match self
            .engine
            .start(request, self.signals.download_done.clone())
        {
            Ok(transfer) => {
                tracing::info!(task_id = %task.id, name = %task.name, url = %task.source_url, "Task submitted");
                registries.downloads.push(DownloadEntry { task, transfer });
                drop(registries);
                self.emit_event(Event::Submitted {
                    id: handle.id,
                    name: handle.name.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, url = %task.source_url, error = %e, "Download engine rejected task");
                task.record_error(&e);
                task.set_stage(Stage::DownloadFailed);
                registries.push_error(task, self.config.retention.max_errors);
                drop(registries);
                self.emit_event(Event::SubmissionRejected {
                    id: handle.id,
                    error: e.to_string(),
                });
            }
        }

        Ok(handle)
    }
}
