mod artifacts;
mod encode;
#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactStore, FsArtifactStore};
pub use encode::{ExportEncoder, CSV_HEADER};

use crate::error::ExportError;
use crate::session::ScanSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

/// File name prefix of structured session documents
pub const STRUCTURED_FILE_PREFIX: &str = "scan_session";

/// File name prefix of tabular session exports
pub const TABULAR_FILE_PREFIX: &str = "scan_data";

/// The two record formats a session is exported to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON document
    Structured,
    /// Fully quoted CSV table
    Tabular,
}

impl ExportFormat {
    pub fn prefix(&self) -> &'static str {
        match self {
            ExportFormat::Structured => STRUCTURED_FILE_PREFIX,
            ExportFormat::Tabular => TABULAR_FILE_PREFIX,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Structured => "json",
            ExportFormat::Tabular => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Outcome of one export call, reported independently per format
#[derive(Debug)]
pub struct ExportArtifacts {
    pub session_id: String,
    pub code_count: usize,
    pub structured: std::result::Result<PathBuf, ExportError>,
    pub tabular: std::result::Result<PathBuf, ExportError>,
}

impl ExportArtifacts {
    /// True when both formats were written
    pub fn is_complete(&self) -> bool {
        self.structured.is_ok() && self.tabular.is_ok()
    }

    /// Paths of whichever formats were written successfully
    pub fn written_paths(&self) -> Vec<&PathBuf> {
        [&self.structured, &self.tabular]
            .into_iter()
            .filter_map(|result| result.as_ref().ok())
            .collect()
    }

    pub fn errors(&self) -> Vec<&ExportError> {
        [&self.structured, &self.tabular]
            .into_iter()
            .filter_map(|result| result.as_ref().err())
            .collect()
    }

    pub fn result(&self, format: ExportFormat) -> &std::result::Result<PathBuf, ExportError> {
        match format {
            ExportFormat::Structured => &self.structured,
            ExportFormat::Tabular => &self.tabular,
        }
    }
}

/// Encode a session to both formats and hand the bytes to the artifact store
///
/// Both formats are written concurrently; a failure in one never short-circuits the other.
pub async fn write_session(
    encoder: &ExportEncoder,
    artifacts: &dyn ArtifactStore,
    session: &ScanSession,
    stamp: DateTime<Utc>,
) -> ExportArtifacts {
    let (structured, tabular) = tokio::join!(
        write_format(encoder, artifacts, ExportFormat::Structured, session, stamp),
        write_format(encoder, artifacts, ExportFormat::Tabular, session, stamp),
    );

    ExportArtifacts {
        session_id: session.session_id().to_string(),
        code_count: session.code_count(),
        structured,
        tabular,
    }
}

async fn write_format(
    encoder: &ExportEncoder,
    artifacts: &dyn ArtifactStore,
    format: ExportFormat,
    session: &ScanSession,
    stamp: DateTime<Utc>,
) -> std::result::Result<PathBuf, ExportError> {
    let result = async {
        let contents = encoder.encode(format, session)?;
        let file_name = encoder.file_name(format, stamp);
        artifacts
            .write(&file_name, contents)
            .await
            .map_err(|source| ExportError::Store { format, source })
    }
    .await;

    match &result {
        Ok(path) => info!(
            "Saved session {} to {}: {}",
            session.session_id(),
            format,
            path.display()
        ),
        Err(e) => error!(
            "Failed to save session {} to {}: {}",
            session.session_id(),
            format,
            e
        ),
    }

    result
}
