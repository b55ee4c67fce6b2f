pub mod app;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod detection;
pub mod error;
pub mod events;
pub mod export;
pub mod feeds;
pub mod session;
pub mod state;

pub use app::{Component, ComponentState, ScanApp, ShutdownReason};
pub use clock::{Clock, ManualClock, SystemClock, TimestampZone};
pub use config::DroneScanConfig;
pub use coordinator::{CaptureCoordinator, CaptureCoordinatorBuilder, CaptureOutcome};
pub use detection::{BarcodeFormat, BoundingBox, DetectedCode, Point};
pub use error::{DroneScanError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, ScanEvent};
pub use export::{ArtifactStore, ExportArtifacts, ExportEncoder, ExportFormat, FsArtifactStore};
pub use feeds::{
    DetectionFeed, FeedEvent, FeedHandle, ManualFeed, PositionFeed, ReplayFeed, ReplayScript,
    TriggerFeed,
};
#[cfg(feature = "keyboard")]
pub use feeds::KeyboardTrigger;
pub use session::{GeoFix, ScanSession, ScannedCode, SessionStore};
pub use state::{ScanPhase, ScanState};
