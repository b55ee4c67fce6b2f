use crate::clock::TimestampZone;
use crate::detection::BarcodeFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single geographic position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

/// One confirmed barcode reading
///
/// `id`, `value`, `format`, `timestamp` and `position` are fixed at construction;
/// only `notes` may change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ScannedCodeRecord", from = "ScannedCodeRecord")]
pub struct ScannedCode {
    id: String,
    value: String,
    format: BarcodeFormat,
    timestamp: DateTime<Utc>,
    position: Option<GeoFix>,
    notes: Option<String>,
}

impl ScannedCode {
    pub(crate) fn new(
        value: String,
        format: BarcodeFormat,
        position: Option<GeoFix>,
        notes: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            value,
            format,
            timestamp,
            position,
            notes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn format(&self) -> BarcodeFormat {
        self.format
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn position(&self) -> Option<&GeoFix> {
        self.position.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes;
    }

    pub fn has_location(&self) -> bool {
        self.position.is_some()
    }

    pub fn formatted_timestamp(&self, zone: &TimestampZone) -> String {
        zone.display(self.timestamp)
    }

    pub fn formatted_location(&self) -> String {
        match &self.position {
            Some(fix) => format!("Lat: {:.6}, Lon: {:.6}", fix.latitude, fix.longitude),
            None => "No location".to_string(),
        }
    }
}

/// Flat wire shape of a scanned code; position fields are all-or-nothing on lat/lon
#[derive(Debug, Serialize, Deserialize)]
struct ScannedCodeRecord {
    id: String,
    value: String,
    format: BarcodeFormat,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    accuracy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl From<ScannedCode> for ScannedCodeRecord {
    fn from(code: ScannedCode) -> Self {
        let fix = code.position;
        Self {
            id: code.id,
            value: code.value,
            format: code.format,
            timestamp: code.timestamp,
            latitude: fix.map(|f| f.latitude),
            longitude: fix.map(|f| f.longitude),
            altitude: fix.and_then(|f| f.altitude),
            accuracy: fix.and_then(|f| f.accuracy),
            notes: code.notes,
        }
    }
}

impl From<ScannedCodeRecord> for ScannedCode {
    fn from(record: ScannedCodeRecord) -> Self {
        let position = match (record.latitude, record.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoFix {
                latitude,
                longitude,
                altitude: record.altitude,
                accuracy: record.accuracy,
            }),
            _ => None,
        };

        Self {
            id: record.id,
            value: record.value,
            format: record.format,
            timestamp: record.timestamp,
            position,
            notes: record.notes,
        }
    }
}

/// One bounded recording period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    session_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    start_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    end_time: Option<DateTime<Utc>>,
    #[serde(rename = "scanned_codes", default)]
    codes: Vec<ScannedCode>,
    #[serde(default)]
    notes: Option<String>,
}

impl ScanSession {
    pub(crate) fn new(notes: Option<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            start_time,
            end_time: None,
            codes: Vec::new(),
            notes,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn codes(&self) -> &[ScannedCode] {
        &self.codes
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes;
    }

    pub(crate) fn push(&mut self, code: ScannedCode) {
        self.codes.push(code);
    }

    pub(crate) fn code_mut(&mut self, id: &str) -> Option<&mut ScannedCode> {
        self.codes.iter_mut().find(|code| code.id == id)
    }

    /// Stamp the end time. A second close keeps the first stamp.
    pub(crate) fn close(&mut self, now: DateTime<Utc>) {
        if self.end_time.is_none() {
            self.end_time = Some(now);
        }
    }

    /// Copy of this session as it would read if closed at `now`
    pub(crate) fn snapshot_at(&self, now: DateTime<Utc>) -> ScanSession {
        let mut snapshot = self.clone();
        snapshot.close(now);
        snapshot
    }

    /// Whole seconds from start until the end time, or until `now` while open
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_seconds()
    }

    pub fn summary(&self, now: DateTime<Utc>, zone: &TimestampZone) -> String {
        format!(
            "Session: {}\nStart: {}\nCodes: {}\nDuration: {}s",
            self.session_id,
            zone.display(self.start_time),
            self.codes.len(),
            self.duration_seconds(now)
        )
    }
}
