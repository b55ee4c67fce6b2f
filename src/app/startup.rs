use super::orchestrator::request_shutdown;
use super::{Component, ComponentState, ScanApp, ShutdownReason};
use crate::error::Result;
use crate::events::{EventFilter, EventReceiver, ScanEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

impl ScanApp {
    /// Register components and report what is already on disk
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing scan application");

        for component in Component::ALL {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
        }

        match self.coordinator.saved_sessions().await {
            Ok(saved) => info!("{} saved session artifacts found", saved.len()),
            Err(e) => warn!("Could not list saved sessions: {}", e),
        }

        Ok(())
    }

    /// Start the coordinator, open a session and begin scanning
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting scan application");

        self.set_component_state(Component::Coordinator, ComponentState::Starting)
            .await;
        let event_loop = self
            .coordinator
            .spawn_event_loop(self.cancellation_token.child_token())?;
        self.tasks.push(("feed_event_loop", event_loop));
        self.spawn_shutdown_listener();
        self.spawn_summary_refresh();
        self.set_component_state(Component::Coordinator, ComponentState::Running)
            .await;

        // Scanning without a position is allowed; codes are stored unlocated
        self.set_component_state(Component::PositionFeed, ComponentState::Starting)
            .await;
        match self.coordinator.start_position_feed().await {
            Ok(()) => {
                self.set_component_state(Component::PositionFeed, ComponentState::Running)
                    .await
            }
            Err(e) => {
                warn!("Position feed unavailable, codes will carry no location: {}", e);
                self.set_component_state(Component::PositionFeed, ComponentState::Failed)
                    .await;
            }
        }

        let session = self
            .coordinator
            .start_session(self.session_notes.clone())
            .await;
        info!("Session {} opened", session.session_id());

        self.set_component_state(Component::Scanning, ComponentState::Starting)
            .await;
        if let Err(e) = self.coordinator.start_scanning().await {
            error!("Failed to start scanning: {}", e);
            self.set_component_state(Component::Scanning, ComponentState::Failed)
                .await;
            return Err(e);
        }
        self.set_component_state(Component::Scanning, ComponentState::Running)
            .await;

        info!("Scan application started");
        Ok(())
    }

    /// Turn `ShutdownRequested` bus events into a shutdown request
    fn spawn_shutdown_listener(&mut self) {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown_listener".to_string(),
        );
        let sender = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.child_token();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(ScanEvent::ShutdownRequested { reason, .. }) => {
                            info!("Shutdown requested: {}", reason);
                            request_shutdown(&sender, ShutdownReason::UserRequest(reason)).await;
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!("Shutdown listener stopped: {}", e);
                            break;
                        }
                    },
                }
            }
        });
        self.tasks.push(("shutdown_listener", handle));
    }

    /// Periodically recompute the summary so the duration keeps moving
    fn spawn_summary_refresh(&mut self) {
        let coordinator = Arc::clone(&self.coordinator);
        let token = self.cancellation_token.child_token();
        let period = Duration::from_millis(self.config.system.summary_refresh_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => coordinator.refresh_summary(),
                }
            }
        });
        self.tasks.push(("summary_refresh", handle));
    }
}
