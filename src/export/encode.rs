use super::ExportFormat;
use crate::clock::TimestampZone;
use crate::error::ExportError;
use crate::session::ScanSession;
use chrono::{DateTime, Utc};

/// Header row of the tabular export, written verbatim
pub const CSV_HEADER: &str = "ID,Value,Format,Timestamp,Latitude,Longitude,Altitude,Accuracy,Notes";

/// Serializes sessions into the structured and tabular formats
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportEncoder {
    zone: TimestampZone,
}

impl ExportEncoder {
    pub fn new(zone: TimestampZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &TimestampZone {
        &self.zone
    }

    pub fn encode(&self, format: ExportFormat, session: &ScanSession) -> Result<Vec<u8>, ExportError> {
        match format {
            ExportFormat::Structured => self.encode_structured(session),
            ExportFormat::Tabular => self.encode_tabular(session),
        }
    }

    /// Pretty-printed JSON document mirroring the session field set
    pub fn encode_structured(&self, session: &ScanSession) -> Result<Vec<u8>, ExportError> {
        serde_json::to_vec_pretty(session).map_err(|e| ExportError::Encode {
            format: ExportFormat::Structured,
            details: e.to_string(),
        })
    }

    pub fn decode_structured(&self, contents: &[u8]) -> Result<ScanSession, ExportError> {
        serde_json::from_slice(contents).map_err(|e| ExportError::Decode {
            format: ExportFormat::Structured,
            details: e.to_string(),
        })
    }

    /// CSV with an unquoted header and one fully quoted row per code, in capture order
    pub fn encode_tabular(&self, session: &ScanSession) -> Result<Vec<u8>, ExportError> {
        let encode_err = |details: String| ExportError::Encode {
            format: ExportFormat::Tabular,
            details,
        };

        let mut buffer = Vec::with_capacity(128 * (session.code_count() + 1));
        buffer.extend_from_slice(CSV_HEADER.as_bytes());
        buffer.push(b'\n');

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(buffer);

        for code in session.codes() {
            let fix = code.position();
            let row = [
                code.id().to_string(),
                code.value().to_string(),
                code.format().to_string(),
                code.formatted_timestamp(&self.zone),
                optional_field(fix.map(|f| f.latitude)),
                optional_field(fix.map(|f| f.longitude)),
                optional_field(fix.and_then(|f| f.altitude)),
                optional_field(fix.and_then(|f| f.accuracy)),
                code.notes().unwrap_or_default().to_string(),
            ];

            writer
                .write_record(&row)
                .map_err(|e| encode_err(e.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|e| encode_err(e.error().to_string()))
    }

    /// `scan_session_<yyyyMMdd_HHmmss>.json` / `scan_data_<yyyyMMdd_HHmmss>.csv`
    pub fn file_name(&self, format: ExportFormat, stamp: DateTime<Utc>) -> String {
        format!(
            "{}_{}.{}",
            format.prefix(),
            self.zone.file_stamp(stamp),
            format.extension()
        )
    }
}

/// Whole numbers keep their `.0` so `30.0` is written as `30.0`, not `30`
fn optional_field<T: std::fmt::Debug>(value: Option<T>) -> String {
    value.map(|v| format!("{:?}", v)).unwrap_or_default()
}
