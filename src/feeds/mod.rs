//! Collaborator feeds that push detections, positions and trigger edges into the coordinator

#[cfg(feature = "keyboard")]
mod keyboard;
mod manual;
mod replay;

#[cfg(feature = "keyboard")]
pub use keyboard::KeyboardTrigger;
pub use manual::ManualFeed;
pub use replay::{ReplayFeed, ReplayScript, ReplayStep};

use crate::detection::DetectedCode;
use crate::error::FeedError;
use crate::session::GeoFix;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Ordered input for the coordination task
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Latest detection batch; an empty batch clears the previous one
    Detections(Vec<DetectedCode>),
    /// Trigger edge; only presses confirm a capture
    Trigger { pressed: bool },
}

/// Receiving half consumed by the coordination task
pub type FeedReceiver = mpsc::UnboundedReceiver<FeedEvent>;

/// Cloneable entry point feeds use from any thread
///
/// Detection batches and trigger edges are queued without loss and processed in
/// arrival order. Positions overwrite each other: only the latest fix is kept.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    events: mpsc::UnboundedSender<FeedEvent>,
    position: Arc<watch::Sender<Option<GeoFix>>>,
}

impl FeedHandle {
    pub fn channel() -> (FeedHandle, FeedReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (position, _) = watch::channel(None);
        (
            FeedHandle {
                events,
                position: Arc::new(position),
            },
            receiver,
        )
    }

    /// Queue a detection batch. Returns false once the coordinator has gone away.
    pub fn on_detection_batch(&self, batch: Vec<DetectedCode>) -> bool {
        self.send(FeedEvent::Detections(batch))
    }

    /// Replace the last-known position; `None` clears it
    pub fn on_position(&self, fix: Option<GeoFix>) {
        self.position.send_replace(fix);
    }

    /// One physical press of the confirm button
    pub fn on_confirm_pulse(&self) -> bool {
        self.on_trigger_edge(true)
    }

    pub fn on_trigger_edge(&self, pressed: bool) -> bool {
        self.send(FeedEvent::Trigger { pressed })
    }

    pub fn latest_position(&self) -> Option<GeoFix> {
        *self.position.borrow()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Option<GeoFix>> {
        self.position.subscribe()
    }

    fn send(&self, event: FeedEvent) -> bool {
        match self.events.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("Coordinator gone, dropping feed event: {:?}", e.0);
                false
            }
        }
    }
}

/// Symbol detector; produces batches only while enabled
#[async_trait]
pub trait DetectionFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn enable(&self, handle: FeedHandle) -> Result<(), FeedError>;

    async fn disable(&self) -> Result<(), FeedError>;
}

/// Confirm button; produces edges only while attached
#[async_trait]
pub trait TriggerFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn attach(&self, handle: FeedHandle) -> Result<(), FeedError>;

    async fn detach(&self) -> Result<(), FeedError>;
}

/// Location sensor; runs for the lifetime of the application
#[async_trait]
pub trait PositionFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, handle: FeedHandle) -> Result<(), FeedError>;

    async fn stop(&self) -> Result<(), FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BarcodeFormat;

    #[tokio::test]
    async fn test_events_keep_order() {
        let (handle, mut receiver) = FeedHandle::channel();

        handle.on_detection_batch(vec![DetectedCode::new("A", BarcodeFormat::QrCode)]);
        handle.on_confirm_pulse();
        handle.on_confirm_pulse();
        handle.on_trigger_edge(false);

        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], FeedEvent::Detections(_)));
        assert_eq!(events[1], FeedEvent::Trigger { pressed: true });
        assert_eq!(events[2], FeedEvent::Trigger { pressed: true });
        assert_eq!(events[3], FeedEvent::Trigger { pressed: false });
    }

    #[test]
    fn test_position_keeps_latest() {
        let (handle, _receiver) = FeedHandle::channel();
        let observer = handle.subscribe_position();

        handle.on_position(Some(GeoFix::new(1.0, 1.0)));
        handle.on_position(Some(GeoFix::new(2.0, 2.0)));
        assert_eq!(*observer.borrow(), Some(GeoFix::new(2.0, 2.0)));

        handle.on_position(None);
        assert_eq!(handle.latest_position(), None);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (handle, receiver) = FeedHandle::channel();
        drop(receiver);
        assert!(!handle.on_confirm_pulse());
    }
}
