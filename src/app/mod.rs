mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::ScanApp;
pub use types::{Component, ComponentState, ShutdownReason};
