mod builder;
mod core;
mod observe;
#[cfg(test)]
mod tests;

pub use builder::CaptureCoordinatorBuilder;
pub use self::core::{CaptureCoordinator, CaptureOutcome};
pub use observe::NO_ACTIVE_SESSION;
