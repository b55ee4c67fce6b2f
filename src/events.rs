use crate::error::EventBusError;
use crate::export::ExportFormat;
use crate::session::ScannedCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications published by the capture coordinator and feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// A new session became current
    SessionStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// An open session was replaced without being saved
    SessionDiscarded {
        session_id: String,
        unsaved_codes: usize,
    },
    /// Detection and trigger feeds went live
    ScanningStarted { timestamp: DateTime<Utc> },
    /// Detection and trigger feeds were detached
    ScanningStopped { timestamp: DateTime<Utc> },
    /// One record was appended to the current session
    CodeCaptured { code: ScannedCode },
    /// A confirm pulse produced `count` records
    CaptureConfirmed { first_value: String, count: usize },
    /// A confirm pulse produced nothing
    CaptureRejected { reason: String },
    /// The current session was closed and handed to export
    SessionClosed {
        session_id: String,
        code_count: usize,
    },
    /// One export format was written
    ExportWritten { format: ExportFormat, path: PathBuf },
    /// One export format failed
    ExportFailed { format: ExportFormat, error: String },
    /// Stored artifacts were deleted
    DataCleared { files_removed: usize },
    /// A feed reported a problem
    FeedError { feed: String, error: String },
    /// Application shutdown requested
    ShutdownRequested {
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

impl ScanEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ScanEvent::SessionStarted { timestamp, .. } => *timestamp,
            ScanEvent::ScanningStarted { timestamp } => *timestamp,
            ScanEvent::ScanningStopped { timestamp } => *timestamp,
            ScanEvent::CodeCaptured { code } => code.timestamp(),
            ScanEvent::ShutdownRequested { timestamp, .. } => *timestamp,
            _ => Utc::now(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            ScanEvent::SessionStarted { session_id, .. } => {
                format!("Session started: {}", session_id)
            }
            ScanEvent::SessionDiscarded {
                session_id,
                unsaved_codes,
            } => format!(
                "Session discarded: {} ({} unsaved codes)",
                session_id, unsaved_codes
            ),
            ScanEvent::ScanningStarted { .. } => "Scanning started".to_string(),
            ScanEvent::ScanningStopped { .. } => "Scanning stopped".to_string(),
            ScanEvent::CodeCaptured { code } => {
                format!("Code captured: {} ({})", code.value(), code.format())
            }
            ScanEvent::CaptureConfirmed { first_value, count } => {
                format!("Capture confirmed: {} ({} codes)", first_value, count)
            }
            ScanEvent::CaptureRejected { reason } => format!("Capture rejected: {}", reason),
            ScanEvent::SessionClosed {
                session_id,
                code_count,
            } => format!("Session closed: {} ({} codes)", session_id, code_count),
            ScanEvent::ExportWritten { format, path } => {
                format!("Exported {}: {}", format, path.display())
            }
            ScanEvent::ExportFailed { format, error } => {
                format!("Export to {} failed: {}", format, error)
            }
            ScanEvent::DataCleared { files_removed } => {
                format!("Data cleared ({} files)", files_removed)
            }
            ScanEvent::FeedError { feed, error } => format!("Error in {}: {}", feed, error),
            ScanEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::SessionStarted { .. } => "session_started",
            ScanEvent::SessionDiscarded { .. } => "session_discarded",
            ScanEvent::ScanningStarted { .. } => "scanning_started",
            ScanEvent::ScanningStopped { .. } => "scanning_stopped",
            ScanEvent::CodeCaptured { .. } => "code_captured",
            ScanEvent::CaptureConfirmed { .. } => "capture_confirmed",
            ScanEvent::CaptureRejected { .. } => "capture_rejected",
            ScanEvent::SessionClosed { .. } => "session_closed",
            ScanEvent::ExportWritten { .. } => "export_written",
            ScanEvent::ExportFailed { .. } => "export_failed",
            ScanEvent::DataCleared { .. } => "data_cleared",
            ScanEvent::FeedError { .. } => "feed_error",
            ScanEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus fanning scan events out to any number of subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers will see it
    ///
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: ScanEvent) -> Result<usize, EventBusError> {
        match &event {
            ScanEvent::SessionDiscarded { .. } | ScanEvent::CaptureRejected { .. } => {
                warn!("{}", event.description());
            }
            ScanEvent::ExportFailed { .. } | ScanEvent::FeedError { .. } => {
                error!("{}", event.description());
            }
            ScanEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Publishing event: {}", event.description()),
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Only `FeedError` events from the named feeds
    Feeds(Vec<String>),
    Custom(fn(&ScanEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &ScanEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Feeds(feeds) => match event {
                ScanEvent::FeedError { feed, .. } => feeds.contains(feed),
                _ => false,
            },
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScanEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ScanEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next event passing the filter
    pub async fn recv(&mut self) -> Result<ScanEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!("Receiver '{}' received: {}", self.name, event.description());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Missed events are gone; keep reading from the oldest retained one
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<Option<ScanEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn shutdown(reason: &str) -> ScanEvent {
        ScanEvent::ShutdownRequested {
            timestamp: Utc::now(),
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus
            .publish(ScanEvent::DataCleared { files_removed: 4 })
            .unwrap();
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            ScanEvent::DataCleared { files_removed } => assert_eq!(files_removed, 4),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(4);
        assert!(!event_bus.has_subscribers());
        assert_eq!(event_bus.publish(shutdown("test")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(shutdown("operator")).unwrap();

        for receiver in [&mut receiver1, &mut receiver2] {
            let event = timeout(Duration::from_millis(100), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.event_type(), "shutdown_requested");
        }
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::EventTypes(vec!["capture_rejected"]);
        assert!(filter.matches(&ScanEvent::CaptureRejected {
            reason: "no code detected".to_string()
        }));
        assert!(!filter.matches(&ScanEvent::DataCleared { files_removed: 0 }));

        let feeds = EventFilter::Feeds(vec!["replay".to_string()]);
        assert!(feeds.matches(&ScanEvent::FeedError {
            feed: "replay".to_string(),
            error: "script ended early".to_string(),
        }));
        assert!(!feeds.matches(&shutdown("replay")));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "test".to_string(),
        );

        event_bus
            .publish(ScanEvent::ScanningStarted {
                timestamp: Utc::now(),
            })
            .unwrap();
        event_bus.publish(shutdown("done")).unwrap();

        let event = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.description(), "Shutdown requested: done");
        assert!(filtered.try_recv().unwrap().is_none());
    }
}
