//! Status reporter: read-only projection of the registries into display lines.

use super::PipelineManager;
use super::task::{DownloadEntry, Task};
use crate::types::{Stage, StatusReport};
use crate::utils::{human_eta, human_size, human_speed};

impl PipelineManager {
    /// Format the download, upload and error registries, one entry per task
    ///
    /// Takes the registry lock once, so the three sequences describe the same
    /// instant. Has no side effects.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example(manager: transit_dl::PipelineManager) {
    /// let report = manager.status().await;
    /// for line in report.downloads.iter().chain(&report.uploads) {
    ///     println!("{line}");
    /// }
    /// for block in &report.errors {
    ///     print!("{block}");
    /// }
    /// # }
    /// ```
    pub async fn status(&self) -> StatusReport {
        let registries = self.registries.lock().await;
        StatusReport {
            downloads: registries.downloads.iter().map(download_line).collect(),
            uploads: registries.uploads.iter().map(upload_line).collect(),
            errors: registries.errors.iter().map(error_block).collect(),
        }
    }
}

/// `name : 1.2 MB / 10.0 MB @ 512.0 KB/s [12.0%, 17s]`
pub(crate) fn download_line(entry: &DownloadEntry) -> String {
    let progress = entry.transfer.progress();
    let total = progress
        .total_bytes
        .map(human_size)
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} : {} / {} @ {} [{:.1}%, {}]",
        entry.task.name,
        human_size(progress.downloaded_bytes),
        total,
        human_speed(progress.speed_bps),
        progress.fraction() * 100.0,
        human_eta(progress.eta()),
    )
}

/// `name : uploading at 40% @ 2.0 MB/s of 10.0 MB`
pub(crate) fn upload_line(task: &Task) -> String {
    let mut line = format!("{} : {}", task.name, task.stage.label());
    if let Some(note) = &task.retry_note {
        line.push_str(&format!(" ({})", note));
    }
    if task.stage == Stage::Uploading {
        match &task.upload_progress {
            None => line.push_str(" but is updating information"),
            Some(progress) => {
                line.push_str(&format!(
                    " at {}% @ {} of {}",
                    (progress.fraction() * 100.0) as u32,
                    human_speed(progress.speed_bps),
                    human_size(progress.total_bytes),
                ));
            }
        }
    }
    line
}

/// Header line followed by every recorded error, each newline-terminated
pub(crate) fn error_block(task: &Task) -> String {
    let mut block = format!("{} : {}\n", task.name, task.stage.label());
    for error in &task.errors {
        block.push_str(error);
        block.push('\n');
    }
    block
}
