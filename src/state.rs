use serde::{Deserialize, Serialize};
use std::fmt;

/// Message carried by the error notice when a confirm pulse finds nothing to capture
pub const NO_CODE_DETECTED: &str = "no code detected";

/// Durable coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanPhase {
    #[default]
    Idle,
    SessionActive,
    Scanning,
}

/// Inputs that drive the phase machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCommand {
    StartSession,
    StartScanning,
    StopScanning,
    CloseSession,
    /// Confirm pulse; carries the first detected value when the batch was non-empty
    Confirm { first_detected: Option<String> },
}

/// Momentary notification emitted alongside a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanNotice {
    CodeCaptured(String),
    Error(String),
}

/// Result of applying one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub phase: ScanPhase,
    pub notice: Option<ScanNotice>,
}

impl Transition {
    fn settle(phase: ScanPhase) -> Self {
        Self {
            phase,
            notice: None,
        }
    }

    /// Observable state: the notice when present, otherwise the phase
    pub fn state(&self) -> ScanState {
        match &self.notice {
            Some(ScanNotice::CodeCaptured(value)) => ScanState::CodeCaptured(value.clone()),
            Some(ScanNotice::Error(message)) => ScanState::Error(message.clone()),
            None => self.phase.into(),
        }
    }
}

impl ScanPhase {
    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanPhase::Scanning)
    }

    /// Pure transition function. Notices never persist: the next command is
    /// evaluated against `phase` alone.
    pub fn apply(self, command: ScanCommand) -> Transition {
        use ScanPhase::*;

        match (self, command) {
            (Idle, ScanCommand::StartSession) => Transition::settle(SessionActive),
            (phase, ScanCommand::StartSession) => Transition::settle(phase),

            (_, ScanCommand::StartScanning) => Transition::settle(Scanning),

            (Scanning, ScanCommand::StopScanning) => Transition::settle(SessionActive),
            (phase, ScanCommand::StopScanning) => Transition::settle(phase),

            (_, ScanCommand::CloseSession) => Transition::settle(Idle),

            (Scanning, ScanCommand::Confirm { first_detected }) => Transition {
                phase: Scanning,
                notice: Some(match first_detected {
                    Some(value) => ScanNotice::CodeCaptured(value),
                    None => ScanNotice::Error(NO_CODE_DETECTED.to_string()),
                }),
            },
            (phase, ScanCommand::Confirm { .. }) => Transition::settle(phase),
        }
    }
}

/// Coordinator state as seen by observers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanState {
    #[default]
    Idle,
    SessionActive,
    Scanning,
    CodeCaptured(String),
    Error(String),
}

impl ScanState {
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanState::CodeCaptured(_) | ScanState::Error(_))
    }
}

impl From<ScanPhase> for ScanState {
    fn from(phase: ScanPhase) -> Self {
        match phase {
            ScanPhase::Idle => ScanState::Idle,
            ScanPhase::SessionActive => ScanState::SessionActive,
            ScanPhase::Scanning => ScanState::Scanning,
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "Idle"),
            ScanState::SessionActive => write!(f, "Session active"),
            ScanState::Scanning => write!(f, "Scanning"),
            ScanState::CodeCaptured(value) => write!(f, "Captured: {}", value),
            ScanState::Error(message) => write!(f, "Error: {}", message),
        }
    }
}
