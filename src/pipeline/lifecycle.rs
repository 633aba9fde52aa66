//! Startup and shutdown coordination.

use super::PipelineManager;
use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;

impl PipelineManager {
    /// Spawn the download supervisor and the upload driver
    ///
    /// Calling `start` again while the loops are running has no effect.
    pub async fn start(&self) {
        let mut workers = self.lifecycle.workers.lock().await;
        if !workers.is_empty() {
            tracing::debug!("Pipeline already started");
            return;
        }
        workers.push(self.start_download_supervisor());
        workers.push(self.start_upload_driver());
        tracing::info!("Pipeline started");
    }

    /// Gracefully shut down the pipeline
    ///
    /// 1. Stops accepting new submissions
    /// 2. Cancels both background loops; an in-flight upload session is aborted
    ///    and its task recorded as failed
    /// 3. Cancels every live download
    /// 4. Waits up to `shutdown_timeout` for the loops to exit
    ///
    /// Tasks still waiting for upload stay where they are; nothing is persisted.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.lifecycle.accepting_new.store(false, Ordering::SeqCst);
        self.lifecycle.cancel.cancel();

        {
            let registries = self.registries.lock().await;
            tracing::debug!(
                active_count = registries.downloads.len(),
                "Cancelling active downloads"
            );
            for entry in &registries.downloads {
                entry.transfer.cancel();
            }
        }

        let workers = std::mem::take(&mut *self.lifecycle.workers.lock().await);
        let timeout = self.config.shutdown_timeout;
        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Background loop ended abnormally");
                    }
                }
                tracing::info!("Background loops stopped");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Timeout waiting for background loops, proceeding with shutdown"
                );
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.lifecycle.accepting_new.load(Ordering::SeqCst)
    }
}
