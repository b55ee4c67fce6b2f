use std::fmt;

/// Parts of the scan application with a tracked lifecycle, in startup order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    /// Feed event loop and background tasks
    Coordinator,
    PositionFeed,
    /// Detector enabled and trigger attached
    Scanning,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Coordinator,
        Component::PositionFeed,
        Component::Scanning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Coordinator => "coordinator",
            Component::PositionFeed => "position_feed",
            Component::Scanning => "scanning",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the application is shutting down
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    /// A feed or host asked to stop, e.g. the keyboard `q` key or a finished replay
    UserRequest(String),
}
