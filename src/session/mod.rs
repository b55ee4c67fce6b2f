mod model;
mod store;

pub use model::{GeoFix, ScanSession, ScannedCode};
pub use store::{SessionStart, SessionStore};
