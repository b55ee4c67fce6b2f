use super::{DetectionFeed, FeedHandle, PositionFeed, TriggerFeed};
use crate::detection::DetectedCode;
use crate::error::FeedError;
use crate::events::{EventBus, ScanEvent};
use crate::session::GeoFix;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scripted flight: timed detection batches, position fixes and confirm pulses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    pub steps: Vec<ReplayStep>,
}

/// One scripted moment, applied after waiting `delay_ms` from the previous step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub position: Option<GeoFix>,
    #[serde(default)]
    pub clear_position: bool,
    #[serde(default)]
    pub detections: Option<Vec<DetectedCode>>,
    #[serde(default)]
    pub confirm: bool,
}

impl ReplayScript {
    pub async fn load(path: &Path) -> Result<Self, FeedError> {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| FeedError::Script {
                path: path.to_path_buf(),
                details: e.to_string(),
            })?;

        serde_json::from_slice(&contents).map_err(|e| FeedError::Script {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
    }
}

#[derive(Default)]
struct ReplayShared {
    handle: Mutex<Option<FeedHandle>>,
    detecting: AtomicBool,
    attached: AtomicBool,
    positioning: AtomicBool,
}

/// Simulator feed replaying a script in all three collaborator roles
///
/// The timeline starts the first time the detector is enabled. Each role only
/// delivers while it is live, so steps landing while scanning is stopped are
/// dropped the way a real detector would drop them.
pub struct ReplayFeed {
    script: Arc<ReplayScript>,
    bus: Arc<EventBus>,
    exit_on_finish: bool,
    shared: Arc<ReplayShared>,
    cancellation_token: CancellationToken,
    timeline: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayFeed {
    pub fn new(script: ReplayScript, bus: Arc<EventBus>) -> Self {
        Self {
            script: Arc::new(script),
            bus,
            exit_on_finish: false,
            shared: Arc::new(ReplayShared::default()),
            cancellation_token: CancellationToken::new(),
            timeline: Mutex::new(None),
        }
    }

    pub async fn from_file(path: &Path, bus: Arc<EventBus>) -> Result<Self, FeedError> {
        let script = ReplayScript::load(path).await?;
        info!(
            "Loaded replay script {} ({} steps)",
            path.display(),
            script.steps.len()
        );
        Ok(Self::new(script, bus))
    }

    /// Request application shutdown once the last step has played
    pub fn with_exit_on_finish(mut self, exit_on_finish: bool) -> Self {
        self.exit_on_finish = exit_on_finish;
        self
    }

    pub fn is_running(&self) -> bool {
        self.timeline
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    fn register(&self, handle: FeedHandle) {
        let mut slot = self.shared.handle.lock();
        if slot.is_none() {
            *slot = Some(handle);
        }
    }

    fn launch(&self) {
        let mut timeline = self.timeline.lock();
        if timeline.is_some() {
            return;
        }

        let script = Arc::clone(&self.script);
        let shared = Arc::clone(&self.shared);
        let bus = Arc::clone(&self.bus);
        let token = self.cancellation_token.clone();
        let exit_on_finish = self.exit_on_finish;

        *timeline = Some(tokio::spawn(async move {
            info!("Replay started ({} steps)", script.steps.len());

            for (index, step) in script.steps.iter().enumerate() {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Replay cancelled at step {}", index);
                        return;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(step.delay_ms)) => {}
                }

                play_step(&shared, index, step);
            }

            info!("Replay finished");
            if exit_on_finish {
                let event = ScanEvent::ShutdownRequested {
                    timestamp: Utc::now(),
                    reason: "Replay finished".to_string(),
                };
                if let Err(e) = bus.publish(event) {
                    warn!("Failed to publish shutdown event: {}", e);
                }
            }
        }));
    }
}

fn play_step(shared: &ReplayShared, index: usize, step: &ReplayStep) {
    let slot = shared.handle.lock();
    let Some(handle) = slot.as_ref() else {
        return;
    };

    if shared.positioning.load(Ordering::SeqCst) {
        if step.clear_position {
            handle.on_position(None);
        } else if step.position.is_some() {
            handle.on_position(step.position);
        }
    }

    if let Some(batch) = &step.detections {
        if shared.detecting.load(Ordering::SeqCst) {
            handle.on_detection_batch(batch.clone());
        } else {
            debug!("Step {}: detector disabled, batch dropped", index);
        }
    }

    if step.confirm {
        if shared.attached.load(Ordering::SeqCst) {
            handle.on_confirm_pulse();
            handle.on_trigger_edge(false);
        } else {
            debug!("Step {}: trigger detached, pulse dropped", index);
        }
    }
}

#[async_trait]
impl DetectionFeed for ReplayFeed {
    fn name(&self) -> &str {
        "replay"
    }

    async fn enable(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.register(handle);
        self.shared.detecting.store(true, Ordering::SeqCst);
        self.launch();
        Ok(())
    }

    async fn disable(&self) -> Result<(), FeedError> {
        self.shared.detecting.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TriggerFeed for ReplayFeed {
    fn name(&self) -> &str {
        "replay"
    }

    async fn attach(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.register(handle);
        self.shared.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn detach(&self) -> Result<(), FeedError> {
        self.shared.attached.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PositionFeed for ReplayFeed {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.register(handle);
        self.shared.positioning.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the whole timeline
    async fn stop(&self) -> Result<(), FeedError> {
        self.shared.positioning.store(false, Ordering::SeqCst);
        self.cancellation_token.cancel();

        let task = self.timeline.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Replay timeline ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BarcodeFormat;
    use crate::feeds::FeedEvent;
    use std::io::Write;
    use tokio::time::timeout;

    fn step(delay_ms: u64) -> ReplayStep {
        ReplayStep {
            delay_ms,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_script_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"steps": [
                {{"delay_ms": 5, "position": {{"latitude": 1.5, "longitude": 2.5}}}},
                {{"detections": [{{"value": "A", "format": "QR_CODE"}}], "confirm": true}},
                {{"clear_position": true}}
            ]}}"#
        )
        .unwrap();

        let script = ReplayScript::load(file.path()).await.unwrap();
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.steps[0].position, Some(GeoFix::new(1.5, 2.5)));
        assert_eq!(
            script.steps[1].detections,
            Some(vec![DetectedCode::new("A", BarcodeFormat::QrCode)])
        );
        assert!(script.steps[1].confirm);
        assert!(script.steps[2].clear_position);
    }

    #[tokio::test]
    async fn test_missing_script_reports_path() {
        let err = ReplayScript::load(Path::new("/nonexistent/flight.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Script { .. }));
    }

    #[tokio::test]
    async fn test_timeline_plays_and_requests_shutdown() {
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();

        let script = ReplayScript {
            steps: vec![
                ReplayStep {
                    position: Some(GeoFix::new(3.0, 4.0)),
                    ..step(0)
                },
                ReplayStep {
                    detections: Some(vec![DetectedCode::new("A", BarcodeFormat::Ean8)]),
                    confirm: true,
                    ..step(5)
                },
            ],
        };
        let feed = ReplayFeed::new(script, Arc::clone(&bus)).with_exit_on_finish(true);
        let (handle, mut receiver) = FeedHandle::channel();

        feed.start(handle.clone()).await.unwrap();
        feed.attach(handle.clone()).await.unwrap();
        feed.enable(handle.clone()).await.unwrap();

        let shutdown = timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shutdown.event_type(), "shutdown_requested");

        assert_eq!(handle.latest_position(), Some(GeoFix::new(3.0, 4.0)));
        assert!(matches!(receiver.try_recv(), Ok(FeedEvent::Detections(_))));
        assert_eq!(receiver.try_recv().unwrap(), FeedEvent::Trigger { pressed: true });
        assert_eq!(receiver.try_recv().unwrap(), FeedEvent::Trigger { pressed: false });

        feed.stop().await.unwrap();
        assert!(!feed.is_running());
    }

    #[tokio::test]
    async fn test_detached_trigger_drops_pulses() {
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();

        let script = ReplayScript {
            steps: vec![ReplayStep {
                confirm: true,
                ..step(0)
            }],
        };
        let feed = ReplayFeed::new(script, Arc::clone(&bus)).with_exit_on_finish(true);
        let (handle, mut receiver) = FeedHandle::channel();

        feed.enable(handle).await.unwrap();
        timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_cancels_long_timeline() {
        let bus = Arc::new(EventBus::new(16));
        let feed = ReplayFeed::new(
            ReplayScript {
                steps: vec![step(60_000)],
            },
            bus,
        );
        let (handle, _receiver) = FeedHandle::channel();

        feed.enable(handle).await.unwrap();
        assert!(feed.is_running());

        timeout(Duration::from_secs(2), feed.stop())
            .await
            .unwrap()
            .unwrap();
        assert!(!feed.is_running());
    }
}
