//! The task entity owned by the registries

use crate::engine::DownloadTransfer;
use crate::types::{
    DownloadProgress, RegistryKind, Stage, SubmitOptions, TaskHandle, TaskId, TaskSnapshot,
    UploadProgress,
};
use std::path::PathBuf;
use std::sync::Arc;

/// One URL moving through the pipeline
#[derive(Clone, Debug)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) source_url: String,
    pub(crate) destination: PathBuf,
    pub(crate) name: String,
    pub(crate) upload: bool,
    pub(crate) delete: bool,
    pub(crate) stage: Stage,
    /// Last progress copied out of the engine (live numbers come from the transfer)
    pub(crate) download_progress: DownloadProgress,
    /// `None` until the storage service acknowledges data for the current session
    pub(crate) upload_progress: Option<UploadProgress>,
    /// "retrying, attempt N of MAX" once a retry has been consumed
    pub(crate) retry_note: Option<String>,
    pub(crate) errors: Vec<String>,
}

impl Task {
    pub(crate) fn new(
        source_url: &str,
        destination: PathBuf,
        name: &str,
        options: SubmitOptions,
    ) -> Self {
        Self {
            id: TaskId::next(),
            source_url: source_url.to_string(),
            destination,
            name: name.to_string(),
            upload: options.upload,
            delete: options.delete,
            stage: Stage::Downloading,
            download_progress: DownloadProgress::default(),
            upload_progress: None,
            retry_note: None,
            errors: Vec::new(),
        }
    }

    pub(crate) fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Move to `next` if the stage graph allows it
    ///
    /// Stages only move forward; an illegal transition is logged and ignored.
    pub(crate) fn set_stage(&mut self, next: Stage) -> bool {
        if self.stage.can_advance_to(next) {
            self.stage = next;
            true
        } else {
            tracing::error!(
                task_id = %self.id,
                from = ?self.stage,
                to = ?next,
                "Refusing backwards stage transition"
            );
            false
        }
    }

    /// Append to the audit trail
    pub(crate) fn record_error(&mut self, error: impl std::fmt::Display) {
        self.errors.push(error.to_string());
    }

    pub(crate) fn snapshot(&self, registry: RegistryKind) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            source_url: self.source_url.clone(),
            destination: self.destination.clone(),
            stage: self.stage,
            registry,
            download: self.download_progress,
            upload: self.upload_progress,
            errors: self.errors.clone(),
        }
    }
}

/// A task in the download registry together with its live transfer
pub(crate) struct DownloadEntry {
    pub(crate) task: Task,
    pub(crate) transfer: Arc<dyn DownloadTransfer>,
}

impl DownloadEntry {
    /// Copy the engine's current numbers onto the task
    pub(crate) fn refresh_progress(&mut self) {
        self.task.download_progress = self.transfer.progress();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            "http://example.com/a",
            PathBuf::from("/tmp/a"),
            "a",
            SubmitOptions::default(),
        )
    }

    #[test]
    fn test_new_task_starts_downloading() {
        let task = task();
        assert_eq!(task.stage, Stage::Downloading);
        assert!(task.upload && task.delete);
        assert!(task.upload_progress.is_none());
        assert!(task.errors.is_empty());
    }

    #[test]
    fn test_stage_never_moves_backwards() {
        let mut task = task();
        assert!(task.set_stage(Stage::AwaitingUpload));
        assert!(task.set_stage(Stage::Uploading));
        assert!(!task.set_stage(Stage::AwaitingUpload));
        assert!(!task.set_stage(Stage::Downloading));
        assert_eq!(task.stage, Stage::Uploading);
        assert!(task.set_stage(Stage::Failed));
        assert!(!task.set_stage(Stage::Completed));
    }

    #[test]
    fn test_errors_are_append_only() {
        let mut task = task();
        task.record_error("first");
        task.record_error(std::io::Error::other("second"));
        assert_eq!(task.errors, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(task().id, task().id);
    }
}
