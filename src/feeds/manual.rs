use super::{DetectionFeed, FeedHandle, PositionFeed, TriggerFeed};
use crate::detection::DetectedCode;
use crate::error::FeedError;
use crate::session::GeoFix;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Host-driven feed covering all three collaborator roles
///
/// Pushes only go through while the matching role is live, the way a real
/// detector stays silent while disabled.
#[derive(Debug, Default)]
pub struct ManualFeed {
    detection: Mutex<Option<FeedHandle>>,
    trigger: Mutex<Option<FeedHandle>>,
    position: Mutex<Option<FeedHandle>>,
    unavailable: AtomicBool,
}

impl ManualFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent enable/attach/start fail
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn is_detecting(&self) -> bool {
        self.detection.lock().is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.trigger.lock().is_some()
    }

    pub fn is_positioning(&self) -> bool {
        self.position.lock().is_some()
    }

    /// Push a detection batch; dropped while the detector is disabled
    pub fn detect(&self, batch: Vec<DetectedCode>) -> bool {
        match self.detection.lock().as_ref() {
            Some(handle) => handle.on_detection_batch(batch),
            None => {
                debug!("Detector disabled, dropping batch of {}", batch.len());
                false
            }
        }
    }

    /// Press and release the confirm button; dropped while detached
    pub fn press(&self) -> bool {
        match self.trigger.lock().as_ref() {
            Some(handle) => handle.on_trigger_edge(true) && handle.on_trigger_edge(false),
            None => false,
        }
    }

    pub fn fix(&self, fix: Option<GeoFix>) -> bool {
        match self.position.lock().as_ref() {
            Some(handle) => {
                handle.on_position(fix);
                true
            }
            None => false,
        }
    }

    fn check_available(&self) -> Result<(), FeedError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("manual".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DetectionFeed for ManualFeed {
    fn name(&self) -> &str {
        "manual"
    }

    async fn enable(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.check_available()?;
        *self.detection.lock() = Some(handle);
        Ok(())
    }

    async fn disable(&self) -> Result<(), FeedError> {
        self.detection.lock().take();
        Ok(())
    }
}

#[async_trait]
impl TriggerFeed for ManualFeed {
    fn name(&self) -> &str {
        "manual"
    }

    async fn attach(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.check_available()?;
        *self.trigger.lock() = Some(handle);
        Ok(())
    }

    async fn detach(&self) -> Result<(), FeedError> {
        self.trigger.lock().take();
        Ok(())
    }
}

#[async_trait]
impl PositionFeed for ManualFeed {
    fn name(&self) -> &str {
        "manual"
    }

    async fn start(&self, handle: FeedHandle) -> Result<(), FeedError> {
        self.check_available()?;
        *self.position.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), FeedError> {
        self.position.lock().take();
        Ok(())
    }
}
