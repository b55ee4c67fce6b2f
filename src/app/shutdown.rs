use super::{Component, ComponentState, ScanApp, ShutdownReason};
use crate::error::Result;
use crate::export::ExportArtifacts;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl ScanApp {
    /// Close and export the open session, then stop background tasks
    ///
    /// Returns the process exit code: non-zero when the shutdown was caused by
    /// an error or when any part of the final export failed.
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let failed = self.failed_components().await;
        if !failed.is_empty() {
            warn!("Shutting down with failed components: {:?}", failed);
        }

        let mut exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        };

        self.set_component_state(Component::Scanning, ComponentState::Stopping)
            .await;
        self.set_component_state(Component::PositionFeed, ComponentState::Stopping)
            .await;

        match timeout(STOP_TIMEOUT, self.coordinator.shutdown()).await {
            Ok(Some(artifacts)) => {
                if !report_final_export(&artifacts) {
                    // Last attempt while the session is still in memory
                    let retried = self.coordinator.retry_unsaved().await;
                    if !retried.iter().all(report_final_export) {
                        exit_code = 1;
                    }
                }
            }
            Ok(None) => info!("No open session to export"),
            Err(_) => {
                error!("Timed out closing the session");
                exit_code = 1;
            }
        }

        self.set_component_state(Component::Scanning, ComponentState::Stopped)
            .await;
        self.set_component_state(Component::PositionFeed, ComponentState::Stopped)
            .await;

        // Cancel all background tasks
        self.set_component_state(Component::Coordinator, ComponentState::Stopping)
            .await;
        self.cancellation_token.cancel();

        let tasks = std::mem::take(&mut self.tasks);
        for (name, handle) in tasks {
            match timeout(STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("{} task stopped", name),
                Ok(Err(e)) => {
                    error!("{} task failed: {}", name, e);
                    exit_code = 1;
                }
                Err(_) => {
                    error!("{} task did not stop within {:?}", name, STOP_TIMEOUT);
                    exit_code = 1;
                }
            }
        }
        self.set_component_state(Component::Coordinator, ComponentState::Stopped)
            .await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}

fn report_final_export(artifacts: &ExportArtifacts) -> bool {
    info!(
        "Session {} closed with {} codes",
        artifacts.session_id, artifacts.code_count
    );
    for path in artifacts.written_paths() {
        info!("Saved {}", path.display());
    }
    for e in artifacts.errors() {
        error!("Export failed: {}", e);
    }
    artifacts.is_complete()
}
