use serde::{Deserialize, Serialize};
use std::fmt;

/// Barcode symbology tag as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BarcodeFormat {
    QrCode,
    Code128,
    Code39,
    Code93,
    Codabar,
    DataMatrix,
    Ean13,
    Ean8,
    Itf,
    UpcA,
    UpcE,
    Pdf417,
    Aztec,
    Unknown,
}

impl BarcodeFormat {
    pub const ALL: [BarcodeFormat; 14] = [
        BarcodeFormat::QrCode,
        BarcodeFormat::Code128,
        BarcodeFormat::Code39,
        BarcodeFormat::Code93,
        BarcodeFormat::Codabar,
        BarcodeFormat::DataMatrix,
        BarcodeFormat::Ean13,
        BarcodeFormat::Ean8,
        BarcodeFormat::Itf,
        BarcodeFormat::UpcA,
        BarcodeFormat::UpcE,
        BarcodeFormat::Pdf417,
        BarcodeFormat::Aztec,
        BarcodeFormat::Unknown,
    ];

    /// Stable tag written to exports
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::QrCode => "QR_CODE",
            BarcodeFormat::Code128 => "CODE_128",
            BarcodeFormat::Code39 => "CODE_39",
            BarcodeFormat::Code93 => "CODE_93",
            BarcodeFormat::Codabar => "CODABAR",
            BarcodeFormat::DataMatrix => "DATA_MATRIX",
            BarcodeFormat::Ean13 => "EAN_13",
            BarcodeFormat::Ean8 => "EAN_8",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::UpcA => "UPC_A",
            BarcodeFormat::UpcE => "UPC_E",
            BarcodeFormat::Pdf417 => "PDF417",
            BarcodeFormat::Aztec => "AZTEC",
            BarcodeFormat::Unknown => "UNKNOWN",
        }
    }

    /// Parse a tag; anything unrecognised maps to `Unknown`
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.as_str().eq_ignore_ascii_case(tag))
            .unwrap_or(BarcodeFormat::Unknown)
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for BarcodeFormat {
    fn from(tag: String) -> Self {
        BarcodeFormat::parse(&tag)
    }
}

impl From<BarcodeFormat> for String {
    fn from(format: BarcodeFormat) -> Self {
        format.as_str().to_string()
    }
}

/// Axis-aligned pixel rectangle around a detected symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A symbol recognised in the current video frame. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectedCode {
    pub value: String,
    pub format: BarcodeFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_points: Option<[Point; 4]>,
}

impl DetectedCode {
    pub fn new(value: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            value: value.into(),
            format,
            bounding_box: None,
            corner_points: None,
        }
    }

    pub fn with_geometry(mut self, bounding_box: BoundingBox, corner_points: [Point; 4]) -> Self {
        self.bounding_box = Some(bounding_box);
        self.corner_points = Some(corner_points);
        self
    }
}
