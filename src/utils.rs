//! Formatting helpers for status lines and local file cleanup

use std::path::Path;
use std::time::Duration;

const SIZE_UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary units, one decimal place
///
/// # Examples
///
/// ```
/// use transit_dl::utils::human_size;
///
/// assert_eq!(human_size(512), "512.0 bytes");
/// assert_eq!(human_size(10 * 1024 * 1024), "10.0 MB");
/// ```
#[must_use]
pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in SIZE_UNITS.iter().take(SIZE_UNITS.len() - 1) {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} {}", value, SIZE_UNITS[SIZE_UNITS.len() - 1])
}

/// Format a transfer rate, e.g. `1.5 MB/s`
#[must_use]
pub fn human_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0.0 bytes/s".to_string();
    }
    format!("{}/s", human_size(bytes_per_sec.round() as u64))
}

/// Format a remaining-time estimate, e.g. `1h 02m 05s`
#[must_use]
pub fn human_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "unknown".to_string();
    };
    let secs = eta.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Remove a finished artifact, logging instead of failing the task
pub(crate) async fn remove_local_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "Removed local file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Local file already gone");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove local file");
        }
    }
}
