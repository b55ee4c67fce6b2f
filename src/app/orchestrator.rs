use super::types::{Component, ComponentState, ShutdownReason};
use crate::clock::SystemClock;
use crate::config::DroneScanConfig;
use crate::coordinator::{CaptureCoordinator, CaptureCoordinatorBuilder};
use crate::error::Result;
use crate::events::EventBus;
use crate::export::{ExportEncoder, FsArtifactStore};
use crate::feeds::{DetectionFeed, ManualFeed, PositionFeed, ReplayFeed, TriggerFeed};
use crate::session::SessionStore;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wires configuration, storage, feeds and the capture coordinator into one
/// running scan application
pub struct ScanApp {
    pub(super) config: DroneScanConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) coordinator: Arc<CaptureCoordinator>,
    pub(super) session_notes: Option<String>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<BTreeMap<Component, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ScanApp {
    /// Create the application with the feeds the configuration selects
    pub async fn new(config: DroneScanConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

        let detection: Arc<dyn DetectionFeed>;
        let position: Arc<dyn PositionFeed>;
        let fallback_trigger: Arc<dyn TriggerFeed>;
        match &config.feeds.replay_script {
            Some(script) => {
                let replay = Arc::new(
                    ReplayFeed::from_file(Path::new(script), Arc::clone(&event_bus))
                        .await?
                        .with_exit_on_finish(config.feeds.exit_on_replay_end),
                );
                detection = replay.clone();
                position = replay.clone();
                fallback_trigger = replay;
            }
            None => {
                info!("No replay script configured; detections must be pushed by the host");
                let manual = Arc::new(ManualFeed::new());
                detection = manual.clone();
                position = manual.clone();
                fallback_trigger = manual;
            }
        }

        let trigger = select_trigger(&config, &event_bus, fallback_trigger);
        Self::assemble(config, event_bus, detection, trigger, position)
    }

    /// Create the application around one feed serving all three roles
    pub fn with_feed<F>(config: DroneScanConfig, feed: Arc<F>) -> Result<Self>
    where
        F: DetectionFeed + TriggerFeed + PositionFeed + 'static,
    {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        Self::assemble(config, event_bus, feed.clone(), feed.clone(), feed)
    }

    fn assemble(
        config: DroneScanConfig,
        event_bus: Arc<EventBus>,
        detection: Arc<dyn DetectionFeed>,
        trigger: Arc<dyn TriggerFeed>,
        position: Arc<dyn PositionFeed>,
    ) -> Result<Self> {
        let folder = config.storage.artifact_folder();
        info!("Artifacts are stored in {}", folder.display());

        let store = Arc::new(SessionStore::new(
            ExportEncoder::new(config.export.zone()),
            Arc::new(FsArtifactStore::new(folder)),
            Arc::new(SystemClock),
        ));

        let coordinator = CaptureCoordinatorBuilder::new()
            .store(store)
            .event_bus(Arc::clone(&event_bus))
            .detection_feed(detection)
            .trigger_feed(trigger)
            .position_feed(position)
            .build()?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            coordinator: Arc::new(coordinator),
            session_notes: None,
            component_states: Arc::new(Mutex::new(BTreeMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Notes attached to the session opened at startup
    pub fn with_session_notes(mut self, notes: Option<String>) -> Self {
        self.session_notes = notes;
        self
    }

    pub fn config(&self) -> &DroneScanConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn coordinator(&self) -> &Arc<CaptureCoordinator> {
        &self.coordinator
    }

    /// Ask a running application to shut down; only the first request counts
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        request_shutdown(&self.shutdown_sender, reason).await
    }
}

pub(super) async fn request_shutdown(
    sender: &Mutex<Option<oneshot::Sender<ShutdownReason>>>,
    reason: ShutdownReason,
) -> bool {
    match sender.lock().await.take() {
        Some(sender) => sender.send(reason).is_ok(),
        None => false,
    }
}

#[cfg(feature = "keyboard")]
fn select_trigger(
    config: &DroneScanConfig,
    event_bus: &Arc<EventBus>,
    fallback: Arc<dyn TriggerFeed>,
) -> Arc<dyn TriggerFeed> {
    if config.feeds.keyboard_trigger {
        info!("Using the keyboard as the confirm button");
        Arc::new(crate::feeds::KeyboardTrigger::new(Arc::clone(event_bus)))
    } else {
        fallback
    }
}

#[cfg(not(feature = "keyboard"))]
fn select_trigger(
    config: &DroneScanConfig,
    _event_bus: &Arc<EventBus>,
    fallback: Arc<dyn TriggerFeed>,
) -> Arc<dyn TriggerFeed> {
    if config.feeds.keyboard_trigger {
        tracing::warn!("Keyboard trigger requested but the keyboard feature is disabled");
    }
    fallback
}
