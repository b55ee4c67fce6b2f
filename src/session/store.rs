use super::model::{GeoFix, ScanSession, ScannedCode};
use crate::clock::Clock;
use crate::detection::{BarcodeFormat, DetectedCode};
use crate::error::{DroneScanError, Result};
use crate::export::{self, ArtifactStore, ExportArtifacts, ExportEncoder, ExportFormat};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of starting a session
///
/// Starting a session while another is open discards the open one without saving it;
/// the dropped session is handed back here so callers can report what was lost.
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub session: ScanSession,
    pub discarded: Option<ScanSession>,
}

/// Owns the current open scan session and its persistence
pub struct SessionStore {
    current: Mutex<Option<ScanSession>>,
    /// Closed sessions whose export did not write both formats
    unsaved: Mutex<Vec<ScanSession>>,
    clock: Arc<dyn Clock>,
    encoder: ExportEncoder,
    artifacts: Arc<dyn ArtifactStore>,
}

impl SessionStore {
    pub fn new(
        encoder: ExportEncoder,
        artifacts: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            current: Mutex::new(None),
            unsaved: Mutex::new(Vec::new()),
            clock,
            encoder,
            artifacts,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn encoder(&self) -> &ExportEncoder {
        &self.encoder
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Start a new session, discarding any open one unsaved
    pub fn begin_session(&self, notes: Option<String>) -> SessionStart {
        let session = ScanSession::new(notes, self.clock.now());
        let discarded = self.current.lock().replace(session.clone());

        if let Some(previous) = &discarded {
            warn!(
                "Discarded open session {} with {} unsaved codes",
                previous.session_id(),
                previous.code_count()
            );
        }
        info!("Started new scan session: {}", session.session_id());

        SessionStart { session, discarded }
    }

    pub fn start_session(&self, notes: Option<String>) -> ScanSession {
        self.begin_session(notes).session
    }

    pub fn has_open_session(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Immutable snapshot of the open session
    pub fn current_session(&self) -> Option<ScanSession> {
        self.current.lock().clone()
    }

    /// Append one reading, starting a session first if none is open
    pub fn add_scanned_code(
        &self,
        value: impl Into<String>,
        format: BarcodeFormat,
        position: Option<GeoFix>,
        notes: Option<String>,
    ) -> Result<ScannedCode> {
        let value = value.into();
        if value.is_empty() {
            return Err(DroneScanError::InvalidCode(
                "decoded value must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut current = self.current.lock();
        let session = Self::open_or_start(&mut current, now);

        let code = ScannedCode::new(value, format, position, notes, now);
        session.push(code.clone());
        debug!("Added scanned code: {} ({})", code.value(), code.format());

        Ok(code)
    }

    /// Append one reading per detected symbol under a single lock, all sharing `position`
    pub fn add_detected_batch(
        &self,
        batch: &[DetectedCode],
        position: Option<GeoFix>,
    ) -> Vec<ScannedCode> {
        let now = self.clock.now();
        let mut current = self.current.lock();
        let session = Self::open_or_start(&mut current, now);

        let mut added = Vec::with_capacity(batch.len());
        for detected in batch {
            if detected.value.is_empty() {
                warn!("Skipping detected {} symbol with empty value", detected.format);
                continue;
            }

            let code = ScannedCode::new(detected.value.clone(), detected.format, position, None, now);
            session.push(code.clone());
            added.push(code);
        }

        debug!(
            "Added {} scanned codes to session {}",
            added.len(),
            session.session_id()
        );
        added
    }

    fn open_or_start(
        current: &mut Option<ScanSession>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> &mut ScanSession {
        current.get_or_insert_with(|| {
            warn!("No active session, creating new one");
            let session = ScanSession::new(None, now);
            info!("Started new scan session: {}", session.session_id());
            session
        })
    }

    /// Replace the open session's notes; returns false when no session is open
    pub fn set_session_notes(&self, notes: Option<String>) -> bool {
        match self.current.lock().as_mut() {
            Some(session) => {
                session.set_notes(notes);
                true
            }
            None => false,
        }
    }

    /// Replace the notes of a code in the open session
    pub fn annotate_code(&self, code_id: &str, notes: Option<String>) -> Result<ScannedCode> {
        let mut current = self.current.lock();
        let session = current
            .as_mut()
            .ok_or_else(|| DroneScanError::component("session_store", "No active session"))?;

        let code = session.code_mut(code_id).ok_or_else(|| {
            DroneScanError::component("session_store", format!("Unknown code id: {}", code_id))
        })?;
        code.set_notes(notes);
        Ok(code.clone())
    }

    /// Stamp the end time, export both formats and detach the session
    ///
    /// Returns `None` when no session was open. A session whose export is incomplete is
    /// kept as unsaved until `retry_unsaved` writes it.
    pub async fn close_session(&self) -> Option<ExportArtifacts> {
        let now = self.clock.now();
        let mut session = self.current.lock().take()?;
        session.close(now);

        let artifacts = self.write(&session).await;
        info!(
            "Session closed: {}, {} codes",
            session.session_id(),
            session.code_count()
        );
        if !artifacts.is_complete() {
            warn!(
                "Export of session {} incomplete, keeping it for retry",
                session.session_id()
            );
            self.unsaved.lock().push(session);
        }
        Some(artifacts)
    }

    /// Closed sessions still waiting for a complete export
    pub fn unsaved_sessions(&self) -> Vec<ScanSession> {
        self.unsaved.lock().clone()
    }

    /// Export every unsaved session again; ones that still fail stay unsaved
    pub async fn retry_unsaved(&self) -> Vec<ExportArtifacts> {
        let pending = std::mem::take(&mut *self.unsaved.lock());
        let mut results = Vec::with_capacity(pending.len());

        for session in pending {
            let artifacts = self.write(&session).await;
            if artifacts.is_complete() {
                info!("Unsaved session {} exported", session.session_id());
            } else {
                self.unsaved.lock().push(session);
            }
            results.push(artifacts);
        }
        results
    }

    /// Export a checkpoint of the open session without closing it
    pub async fn export_current_session(&self) -> Option<ExportArtifacts> {
        let now = self.clock.now();
        let snapshot = self.current.lock().as_ref()?.snapshot_at(now);
        Some(self.write(&snapshot).await)
    }

    async fn write(&self, session: &ScanSession) -> ExportArtifacts {
        let stamp = self.clock.now();
        export::write_session(&self.encoder, self.artifacts.as_ref(), session, stamp).await
    }

    /// Drop the open and unsaved sessions and delete every exported artifact
    pub async fn clear_all_data(&self) -> Result<usize> {
        if let Some(session) = self.current.lock().take() {
            warn!(
                "Dropping open session {} with {} codes",
                session.session_id(),
                session.code_count()
            );
        }
        self.unsaved.lock().clear();

        let removed = self.artifacts.clear().await?;
        info!("Cleared all scan data ({} files)", removed);
        Ok(removed)
    }

    /// Saved structured session documents, newest first
    pub async fn saved_sessions(&self) -> Result<Vec<PathBuf>> {
        let format = ExportFormat::Structured;
        Ok(self
            .artifacts
            .list(format.prefix(), format.extension())
            .await?)
    }

    /// Load a structured session document; bare file names resolve inside the artifact folder
    pub async fn load_session(&self, path: &Path) -> Result<ScanSession> {
        let path = if path.components().count() == 1 {
            self.artifacts.location().join(path)
        } else {
            path.to_path_buf()
        };

        let contents = self.artifacts.read(&path).await?;
        Ok(self.encoder.decode_structured(&contents)?)
    }
}
