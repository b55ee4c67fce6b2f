use crate::clock::TimestampZone;
use crate::session::{ScanSession, ScannedCode};
use crate::state::ScanState;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Summary text published while no session is open
pub const NO_ACTIVE_SESSION: &str = "No active session";

/// Latest-value views published for a host UI
pub(super) struct Observers {
    state: watch::Sender<ScanState>,
    detecting: watch::Sender<bool>,
    codes: watch::Sender<Arc<[ScannedCode]>>,
    summary: watch::Sender<String>,
}

impl Observers {
    pub(super) fn new() -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        let (detecting, _) = watch::channel(false);
        let (codes, _) = watch::channel(Arc::<[ScannedCode]>::from(Vec::new()));
        let (summary, _) = watch::channel(NO_ACTIVE_SESSION.to_string());

        Self {
            state,
            detecting,
            codes,
            summary,
        }
    }

    pub(super) fn set_state(&self, state: ScanState) {
        self.state.send_replace(state);
    }

    pub(super) fn set_detecting(&self, detecting: bool) {
        self.detecting.send_if_modified(|current| {
            let changed = *current != detecting;
            *current = detecting;
            changed
        });
    }

    /// Republish the code list and summary from a session snapshot
    pub(super) fn set_session(
        &self,
        session: Option<&ScanSession>,
        now: DateTime<Utc>,
        zone: &TimestampZone,
    ) {
        match session {
            Some(session) => {
                self.codes.send_replace(Arc::from(session.codes()));
                self.summary.send_replace(session.summary(now, zone));
            }
            None => {
                self.codes.send_replace(Arc::<[ScannedCode]>::from(Vec::new()));
                self.summary.send_replace(NO_ACTIVE_SESSION.to_string());
            }
        }
    }

    pub(super) fn state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    pub(super) fn current_state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    pub(super) fn detecting(&self) -> watch::Receiver<bool> {
        self.detecting.subscribe()
    }

    pub(super) fn codes(&self) -> watch::Receiver<Arc<[ScannedCode]>> {
        self.codes.subscribe()
    }

    pub(super) fn summary(&self) -> watch::Receiver<String> {
        self.summary.subscribe()
    }
}
