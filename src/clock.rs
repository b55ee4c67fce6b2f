use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::warn;

/// Human-readable timestamp layout used in summaries and CSV rows
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compact timestamp layout used in artifact file names
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source of "now" for session bookkeeping
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock truncated to millisecond precision
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_millis(Utc::now())
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(truncate_to_millis(start)),
        }
    }

    /// Move the clock forward by the given number of milliseconds
    pub fn advance_millis(&self, millis: i64) {
        let mut now = self.now.lock();
        *now += ChronoDuration::milliseconds(millis);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = truncate_to_millis(instant);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Instants are persisted as epoch milliseconds, so anything finer is dropped up front
pub fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

/// Timezone used when rendering timestamps for people (CSV, summaries, file names)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TimestampZone {
    #[default]
    Local,
    Named(Tz),
}

impl TimestampZone {
    /// Resolve a configured zone name, falling back to UTC on parse errors
    pub fn resolve(name: &str) -> Self {
        if name.trim().is_empty() || name.eq_ignore_ascii_case("local") {
            return TimestampZone::Local;
        }

        match name.parse::<Tz>() {
            Ok(tz) => TimestampZone::Named(tz),
            Err(_) => {
                warn!("Invalid export timezone '{}', falling back to UTC", name);
                TimestampZone::Named(chrono_tz::UTC)
            }
        }
    }

    pub fn format(&self, instant: DateTime<Utc>, pattern: &str) -> String {
        match self {
            TimestampZone::Local => instant
                .with_timezone(&chrono::Local)
                .format(pattern)
                .to_string(),
            TimestampZone::Named(tz) => instant.with_timezone(tz).format(pattern).to_string(),
        }
    }

    pub fn display(&self, instant: DateTime<Utc>) -> String {
        self.format(instant, DISPLAY_TIMESTAMP_FORMAT)
    }

    pub fn file_stamp(&self, instant: DateTime<Utc>) -> String {
        self.format(instant, FILE_STAMP_FORMAT)
    }
}
