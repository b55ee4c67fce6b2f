use super::orchestrator::request_shutdown;
use super::{ScanApp, ShutdownReason};
use crate::error::{DroneScanError, Result};
use std::sync::Arc;
use tracing::info;

impl ScanApp {
    /// Run until a signal, a feed or the host asks to stop, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Scan application is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| DroneScanError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| DroneScanError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown(shutdown_reason).await?;

        info!("Scan application shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&mut self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    let sender = Arc::clone(&self.shutdown_sender);
                    let token = self.cancellation_token.child_token();
                    let handle = tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            Some(()) = sigterm.recv() => {
                                info!("Received SIGTERM signal");
                                request_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string()))
                                    .await;
                            }
                        }
                    });
                    self.tasks.push(("sigterm_handler", handle));
                }
                Err(e) => tracing::warn!("Failed to register SIGTERM handler: {}", e),
            }
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let sender = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.child_token();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                Ok(()) = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    request_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
                }
            }
        });
        self.tasks.push(("sigint_handler", handle));
    }
}
