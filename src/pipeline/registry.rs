//! Task registries and membership queries
//!
//! All four collections live behind the single `PipelineManager::registries`
//! mutex. Every hand-off removes a task from one collection and pushes it onto
//! another while that lock is held, so readers never see a task twice or not
//! at all.

use super::PipelineManager;
use super::task::{DownloadEntry, Task};
use crate::types::{RegistryKind, TaskId, TaskSnapshot};
use crate::utils::remove_local_file;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// The download, upload, error and completed collections
#[derive(Default)]
pub(crate) struct Registries {
    pub(crate) downloads: Vec<DownloadEntry>,
    /// FIFO; the head is the task the upload driver is working on
    pub(crate) uploads: VecDeque<Task>,
    pub(crate) errors: VecDeque<Task>,
    pub(crate) completed: VecDeque<Task>,
    /// Files of finished tasks still waiting to be removed from disk
    pub(crate) releasing: Vec<PathBuf>,
}

impl Registries {
    /// Which collection holds `id`
    pub(crate) fn locate(&self, id: TaskId) -> Option<RegistryKind> {
        if self.downloads.iter().any(|e| e.task.id == id) {
            Some(RegistryKind::Download)
        } else if self.uploads.iter().any(|t| t.id == id) {
            Some(RegistryKind::Upload)
        } else if self.errors.iter().any(|t| t.id == id) {
            Some(RegistryKind::Error)
        } else if self.completed.iter().any(|t| t.id == id) {
            Some(RegistryKind::Completed)
        } else {
            None
        }
    }

    pub(crate) fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        if let Some(entry) = self.downloads.iter().find(|e| e.task.id == id) {
            let mut snapshot = entry.task.snapshot(RegistryKind::Download);
            snapshot.download = entry.transfer.progress();
            return Some(snapshot);
        }
        [
            (&self.uploads, RegistryKind::Upload),
            (&self.errors, RegistryKind::Error),
            (&self.completed, RegistryKind::Completed),
        ]
        .into_iter()
        .find_map(|(tasks, kind)| {
            tasks
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.snapshot(kind))
        })
    }

    /// Whether a live task, or a removal still in flight, owns `path`
    pub(crate) fn holds_destination(&self, path: &Path) -> bool {
        self.downloads.iter().any(|e| e.task.destination == path)
            || self.uploads.iter().any(|t| t.destination == path)
            || self.releasing.iter().any(|p| p == path)
    }

    pub(crate) fn upload_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.uploads.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn take_upload(&mut self, id: TaskId) -> Option<Task> {
        let index = self.uploads.iter().position(|t| t.id == id)?;
        self.uploads.remove(index)
    }

    /// Add to the error registry, evicting the oldest entries past `max`
    pub(crate) fn push_error(&mut self, task: Task, max: Option<usize>) {
        self.errors.push_back(task);
        if let Some(max) = max {
            while self.errors.len() > max {
                if let Some(evicted) = self.errors.pop_front() {
                    tracing::debug!(task_id = %evicted.id, "Evicted task from error history");
                }
            }
        }
    }

    /// Add to the completed history, evicting the oldest entries past `max`
    pub(crate) fn push_completed(&mut self, task: Task, max: usize) {
        self.completed.push_back(task);
        while self.completed.len() > max {
            self.completed.pop_front();
        }
    }
}

impl PipelineManager {
    /// Which registry currently holds the task
    ///
    /// Returns `None` only for unknown IDs or tasks evicted from a bounded history.
    pub async fn locate(&self, id: TaskId) -> Option<RegistryKind> {
        self.registries.lock().await.locate(id)
    }

    /// Point-in-time copy of a task's stage, progress and error trail
    pub async fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.registries.lock().await.snapshot(id)
    }

    /// Remove a file reserved in `releasing`, then drop the reservation
    pub(crate) async fn release_local_file(&self, path: PathBuf) {
        remove_local_file(&path).await;
        self.registries
            .lock()
            .await
            .releasing
            .retain(|p| *p != path);
    }

    /// Names of tasks that reached the success end, oldest first
    pub async fn completed(&self) -> Vec<String> {
        self.registries
            .lock()
            .await
            .completed
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }
}
