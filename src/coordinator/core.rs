use super::observe::Observers;
use crate::detection::DetectedCode;
use crate::error::{DroneScanError, FeedError, Result};
use crate::events::{EventBus, ScanEvent};
use crate::export::{ExportArtifacts, ExportFormat};
use crate::feeds::{DetectionFeed, FeedEvent, FeedHandle, FeedReceiver, PositionFeed, TriggerFeed};
use crate::session::{GeoFix, ScanSession, ScannedCode, SessionStore};
use crate::state::{ScanCommand, ScanPhase, ScanState, Transition, NO_CODE_DETECTED};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one confirm pulse
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Not scanning; nothing happened
    Ignored,
    /// One record per symbol in the last batch, in batch order
    Captured(Vec<ScannedCode>),
    /// Scanning, but the last batch was empty
    Rejected,
}

struct CoordinatorState {
    phase: ScanPhase,
    detections: Vec<DetectedCode>,
}

/// Fuses detection, position and trigger feeds into session records
///
/// Phase and detection state sit behind one mutex that is always taken before
/// the session store's. Async commands are additionally serialized so feed
/// enable/disable calls never interleave. The feed receiver is shared between
/// the event loop and the commands: a command drains events queued before it
/// changes the phase, and the receiver lock is taken before the state lock.
pub struct CaptureCoordinator {
    store: Arc<SessionStore>,
    event_bus: Arc<EventBus>,
    detection_feed: Arc<dyn DetectionFeed>,
    trigger_feed: Arc<dyn TriggerFeed>,
    position_feed: Arc<dyn PositionFeed>,
    feed_handle: FeedHandle,
    feed_receiver: Mutex<FeedReceiver>,
    loop_started: AtomicBool,
    position: watch::Receiver<Option<GeoFix>>,
    state: Mutex<CoordinatorState>,
    commands: tokio::sync::Mutex<()>,
    observers: Observers,
}

impl CaptureCoordinator {
    pub(super) fn new(
        store: Arc<SessionStore>,
        event_bus: Arc<EventBus>,
        detection_feed: Arc<dyn DetectionFeed>,
        trigger_feed: Arc<dyn TriggerFeed>,
        position_feed: Arc<dyn PositionFeed>,
    ) -> Self {
        let (feed_handle, feed_receiver) = FeedHandle::channel();
        let position = feed_handle.subscribe_position();
        let phase = if store.has_open_session() {
            ScanPhase::SessionActive
        } else {
            ScanPhase::Idle
        };

        let coordinator = Self {
            store,
            event_bus,
            detection_feed,
            trigger_feed,
            position_feed,
            feed_handle,
            feed_receiver: Mutex::new(feed_receiver),
            loop_started: AtomicBool::new(false),
            position,
            state: Mutex::new(CoordinatorState {
                phase,
                detections: Vec::new(),
            }),
            commands: tokio::sync::Mutex::new(()),
            observers: Observers::new(),
        };
        coordinator.observers.set_state(phase.into());
        coordinator.refresh_summary();
        coordinator
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle feeds push into
    pub fn feed_handle(&self) -> FeedHandle {
        self.feed_handle.clone()
    }

    pub fn phase(&self) -> ScanPhase {
        self.state.lock().phase
    }

    /// Spawn the task that handles feed events in arrival order
    pub fn spawn_event_loop(self: &Arc<Self>, token: CancellationToken) -> Result<JoinHandle<()>> {
        if self.loop_started.swap(true, Ordering::SeqCst) {
            return Err(DroneScanError::component(
                "capture_coordinator",
                "Event loop already running",
            ));
        }

        let coordinator = Arc::clone(self);
        Ok(tokio::spawn(async move {
            debug!("Feed event loop started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    open = std::future::poll_fn(|cx| coordinator.poll_feed_event(cx)) => {
                        if !open {
                            break;
                        }
                    }
                }
            }
            debug!("Feed event loop stopped");
        }))
    }

    /// Receive and handle one event while holding the receiver, so a
    /// concurrent drain waits for it; `false` once the channel is closed
    fn poll_feed_event(&self, cx: &mut Context<'_>) -> Poll<bool> {
        let mut receiver = self.feed_receiver.lock();
        match receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                self.handle_feed_event(event);
                Poll::Ready(true)
            }
            Poll::Ready(None) => Poll::Ready(false),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Handle every event already queued, returning how many there were
    pub fn drain_feed_events(&self) -> usize {
        let mut receiver = self.feed_receiver.lock();
        let mut handled = 0;
        while let Ok(event) = receiver.try_recv() {
            self.handle_feed_event(event);
            handled += 1;
        }
        if handled > 0 {
            debug!("Drained {} queued feed events", handled);
        }
        handled
    }

    /// Apply one feed event against the already-known state
    pub fn handle_feed_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Detections(batch) => self.update_detections(batch),
            FeedEvent::Trigger { pressed: true } => {
                self.confirm_capture();
            }
            FeedEvent::Trigger { pressed: false } => {}
        }
    }

    fn update_detections(&self, batch: Vec<DetectedCode>) {
        let mut state = self.state.lock();
        if !state.phase.is_scanning() {
            debug!("Detector batch of {} ignored while not scanning", batch.len());
            return;
        }

        state.detections = batch.into_iter().filter(|d| !d.value.is_empty()).collect();
        self.observers.set_detecting(!state.detections.is_empty());
    }

    /// Resolve a confirm pulse against the last detection batch and position
    pub fn confirm_capture(&self) -> CaptureOutcome {
        let mut state = self.state.lock();
        if !state.phase.is_scanning() {
            warn!("Confirm pulse ignored while {:?}", state.phase);
            return CaptureOutcome::Ignored;
        }

        let position = *self.position.borrow();
        let captured = if state.detections.is_empty() {
            Vec::new()
        } else {
            self.store.add_detected_batch(&state.detections, position)
        };

        let transition = state.phase.apply(ScanCommand::Confirm {
            first_detected: captured.first().map(|code| code.value().to_string()),
        });
        self.settle(&mut state, transition);
        drop(state);

        if captured.is_empty() {
            self.publish(ScanEvent::CaptureRejected {
                reason: NO_CODE_DETECTED.to_string(),
            });
            return CaptureOutcome::Rejected;
        }

        info!(
            "Captured {} codes (first: {})",
            captured.len(),
            captured[0].value()
        );
        for code in &captured {
            self.publish(ScanEvent::CodeCaptured { code: code.clone() });
        }
        self.publish(ScanEvent::CaptureConfirmed {
            first_value: captured[0].value().to_string(),
            count: captured.len(),
        });

        CaptureOutcome::Captured(captured)
    }

    /// Start a new session; an open one is discarded unsaved
    pub async fn start_session(&self, notes: Option<String>) -> ScanSession {
        let _guard = self.commands.lock().await;
        self.begin_session(notes)
    }

    fn begin_session(&self, notes: Option<String>) -> ScanSession {
        // Captures queued for the old session land there before it is replaced
        self.drain_feed_events();
        let mut state = self.state.lock();
        let start = self.store.begin_session(notes);
        let transition = state.phase.apply(ScanCommand::StartSession);
        self.settle(&mut state, transition);
        drop(state);

        if let Some(discarded) = &start.discarded {
            self.publish(ScanEvent::SessionDiscarded {
                session_id: discarded.session_id().to_string(),
                unsaved_codes: discarded.code_count(),
            });
        }
        self.publish(ScanEvent::SessionStarted {
            session_id: start.session.session_id().to_string(),
            timestamp: start.session.start_time(),
        });

        start.session
    }

    /// Make the detector and trigger live, starting a session first if none is open
    pub async fn start_scanning(&self) -> Result<()> {
        let _guard = self.commands.lock().await;
        if self.phase().is_scanning() {
            debug!("Already scanning");
            return Ok(());
        }

        // Anything queued since the last stop belongs to that stop
        self.drain_feed_events();
        if !self.store.has_open_session() {
            self.begin_session(None);
        }

        self.detection_feed
            .enable(self.feed_handle.clone())
            .await
            .map_err(|e| self.feed_failure(self.detection_feed.name(), e))?;

        if let Err(e) = self.trigger_feed.attach(self.feed_handle.clone()).await {
            if let Err(revert) = self.detection_feed.disable().await {
                warn!("Failed to disable detector after trigger error: {}", revert);
            }
            return Err(self.feed_failure(self.trigger_feed.name(), e));
        }

        {
            let mut state = self.state.lock();
            state.detections.clear();
            let transition = state.phase.apply(ScanCommand::StartScanning);
            self.settle(&mut state, transition);
        }
        self.observers.set_detecting(false);

        info!(
            "Scanning started ({} detector, {} trigger)",
            self.detection_feed.name(),
            self.trigger_feed.name()
        );
        self.publish(ScanEvent::ScanningStarted {
            timestamp: self.store.clock().now(),
        });
        Ok(())
    }

    /// Detach detector and trigger; a no-op when not scanning
    pub async fn stop_scanning(&self) -> Result<()> {
        let _guard = self.commands.lock().await;
        self.halt_scanning().await
    }

    async fn halt_scanning(&self) -> Result<()> {
        if !self.phase().is_scanning() {
            return Ok(());
        }

        let disabled = self.detection_feed.disable().await;
        let detached = self.trigger_feed.detach().await;
        // Feeds are silent now; resolve pulses that were accepted before the stop
        self.drain_feed_events();

        {
            let mut state = self.state.lock();
            state.detections.clear();
            let transition = state.phase.apply(ScanCommand::StopScanning);
            self.settle(&mut state, transition);
        }
        self.observers.set_detecting(false);

        info!("Scanning stopped");
        self.publish(ScanEvent::ScanningStopped {
            timestamp: self.store.clock().now(),
        });

        disabled.map_err(|e| self.feed_failure(self.detection_feed.name(), e))?;
        detached.map_err(|e| self.feed_failure(self.trigger_feed.name(), e))?;
        Ok(())
    }

    /// Stop scanning, close the session and export it
    pub async fn close_session(&self) -> Option<ExportArtifacts> {
        let _guard = self.commands.lock().await;
        self.finish_session().await
    }

    async fn finish_session(&self) -> Option<ExportArtifacts> {
        if let Err(e) = self.halt_scanning().await {
            warn!("Feed error while closing session: {}", e);
        }

        let artifacts = self.store.close_session().await;
        {
            let mut state = self.state.lock();
            let transition = state.phase.apply(ScanCommand::CloseSession);
            self.settle(&mut state, transition);
        }

        let artifacts = artifacts?;
        self.publish(ScanEvent::SessionClosed {
            session_id: artifacts.session_id.clone(),
            code_count: artifacts.code_count,
        });
        self.report_exports(&artifacts);
        Some(artifacts)
    }

    /// Checkpoint export; the session stays open and scanning is unaffected
    pub async fn export_current_session(&self) -> Option<ExportArtifacts> {
        self.drain_feed_events();
        let artifacts = self.store.export_current_session().await?;
        self.report_exports(&artifacts);
        Some(artifacts)
    }

    /// Closed sessions whose export is still incomplete
    pub fn unsaved_sessions(&self) -> Vec<ScanSession> {
        self.store.unsaved_sessions()
    }

    /// Export unsaved sessions again and report each attempt on the bus
    pub async fn retry_unsaved(&self) -> Vec<ExportArtifacts> {
        let results = self.store.retry_unsaved().await;
        for artifacts in &results {
            self.report_exports(artifacts);
        }
        results
    }

    /// Stop scanning, drop the open session and delete every stored artifact
    pub async fn clear_all_data(&self) -> Result<usize> {
        let _guard = self.commands.lock().await;
        if let Err(e) = self.halt_scanning().await {
            warn!("Feed error while clearing data: {}", e);
        }

        let removed = self.store.clear_all_data().await;
        {
            let mut state = self.state.lock();
            let transition = state.phase.apply(ScanCommand::CloseSession);
            self.settle(&mut state, transition);
        }

        let removed = removed?;
        self.publish(ScanEvent::DataCleared {
            files_removed: removed,
        });
        Ok(removed)
    }

    pub fn set_session_notes(&self, notes: Option<String>) -> bool {
        let updated = self.store.set_session_notes(notes);
        self.refresh_summary();
        updated
    }

    pub fn annotate_code(&self, code_id: &str, notes: Option<String>) -> Result<ScannedCode> {
        let code = self.store.annotate_code(code_id, notes)?;
        self.refresh_summary();
        Ok(code)
    }

    pub async fn saved_sessions(&self) -> Result<Vec<PathBuf>> {
        self.store.saved_sessions().await
    }

    pub async fn load_session(&self, path: &Path) -> Result<ScanSession> {
        self.store.load_session(path).await
    }

    /// Start the position feed; it stays live until shutdown
    pub async fn start_position_feed(&self) -> Result<()> {
        self.position_feed
            .start(self.feed_handle.clone())
            .await
            .map_err(|e| self.feed_failure(self.position_feed.name(), e))
    }

    /// Stop scanning, close and export the open session, then stop the position feed
    pub async fn shutdown(&self) -> Option<ExportArtifacts> {
        let _guard = self.commands.lock().await;
        let artifacts = self.finish_session().await;

        if let Err(e) = self.position_feed.stop().await {
            error!("Failed to stop {} position feed: {}", self.position_feed.name(), e);
        }
        artifacts
    }

    /// Republish the code list and summary; durations move with the clock
    pub fn refresh_summary(&self) {
        let session = self.store.current_session();
        self.observers.set_session(
            session.as_ref(),
            self.store.clock().now(),
            self.store.encoder().zone(),
        );
    }

    pub fn scan_state(&self) -> watch::Receiver<ScanState> {
        self.observers.state()
    }

    pub fn current_state(&self) -> ScanState {
        self.observers.current_state()
    }

    pub fn detection_active(&self) -> watch::Receiver<bool> {
        self.observers.detecting()
    }

    pub fn scanned_codes(&self) -> watch::Receiver<Arc<[ScannedCode]>> {
        self.observers.codes()
    }

    pub fn session_summary(&self) -> watch::Receiver<String> {
        self.observers.summary()
    }

    pub fn position(&self) -> watch::Receiver<Option<GeoFix>> {
        self.position.clone()
    }

    fn settle(&self, state: &mut CoordinatorState, transition: Transition) {
        state.phase = transition.phase;
        self.observers.set_state(transition.state());
        self.refresh_summary();
    }

    fn report_exports(&self, artifacts: &ExportArtifacts) {
        for format in [ExportFormat::Structured, ExportFormat::Tabular] {
            let event = match artifacts.result(format) {
                Ok(path) => ScanEvent::ExportWritten {
                    format,
                    path: path.clone(),
                },
                Err(e) => ScanEvent::ExportFailed {
                    format,
                    error: e.to_string(),
                },
            };
            self.publish(event);
        }
    }

    fn feed_failure(&self, feed: &str, error: FeedError) -> DroneScanError {
        self.publish(ScanEvent::FeedError {
            feed: feed.to_string(),
            error: error.to_string(),
        });
        error.into()
    }

    fn publish(&self, event: ScanEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            warn!("Failed to publish scan event: {}", e);
        }
    }
}
