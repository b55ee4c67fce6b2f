use super::CaptureCoordinator;
use crate::error::{DroneScanError, Result};
use crate::events::EventBus;
use crate::feeds::{DetectionFeed, PositionFeed, TriggerFeed};
use crate::session::SessionStore;
use std::sync::Arc;

/// Builder for the capture coordinator
#[derive(Default)]
pub struct CaptureCoordinatorBuilder {
    store: Option<Arc<SessionStore>>,
    event_bus: Option<Arc<EventBus>>,
    detection_feed: Option<Arc<dyn DetectionFeed>>,
    trigger_feed: Option<Arc<dyn TriggerFeed>>,
    position_feed: Option<Arc<dyn PositionFeed>>,
}

impl CaptureCoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn detection_feed(mut self, feed: Arc<dyn DetectionFeed>) -> Self {
        self.detection_feed = Some(feed);
        self
    }

    pub fn trigger_feed(mut self, feed: Arc<dyn TriggerFeed>) -> Self {
        self.trigger_feed = Some(feed);
        self
    }

    pub fn position_feed(mut self, feed: Arc<dyn PositionFeed>) -> Self {
        self.position_feed = Some(feed);
        self
    }

    /// Use one feed in all three roles; roles set explicitly afterwards win
    pub fn feeds<F>(self, feed: Arc<F>) -> Self
    where
        F: DetectionFeed + TriggerFeed + PositionFeed + 'static,
    {
        self.detection_feed(feed.clone())
            .trigger_feed(feed.clone())
            .position_feed(feed)
    }

    pub fn build(self) -> Result<CaptureCoordinator> {
        let store = self.store.ok_or_else(|| missing("Session store"))?;
        let event_bus = self.event_bus.ok_or_else(|| missing("Event bus"))?;
        let detection_feed = self.detection_feed.ok_or_else(|| missing("Detection feed"))?;
        let trigger_feed = self.trigger_feed.ok_or_else(|| missing("Trigger feed"))?;
        let position_feed = self.position_feed.ok_or_else(|| missing("Position feed"))?;

        Ok(CaptureCoordinator::new(
            store,
            event_bus,
            detection_feed,
            trigger_feed,
            position_feed,
        ))
    }
}

fn missing(what: &str) -> DroneScanError {
    DroneScanError::component(
        "capture_coordinator_builder",
        format!("{} is required", what),
    )
}
