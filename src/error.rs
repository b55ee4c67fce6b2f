use std::path::PathBuf;
use thiserror::Error;

use crate::export::ExportFormat;

#[derive(Error, Debug)]
pub enum DroneScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Invalid scanned code: {0}")]
    InvalidCode(String),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl DroneScanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Filesystem collaborator failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path {0} is outside the artifact folder")]
    OutsideFolder(PathBuf),

    #[error("Injected fault: {0}")]
    Fault(String),
}

/// Per-format export failures; one format failing never affects the other
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode {format} export: {details}")]
    Encode { format: ExportFormat, details: String },

    #[error("Failed to decode {format} export: {details}")]
    Decode { format: ExportFormat, details: String },

    #[error("Failed to store {format} export: {source}")]
    Store {
        format: ExportFormat,
        #[source]
        source: StorageError,
    },
}

impl ExportError {
    pub fn format(&self) -> ExportFormat {
        match self {
            ExportError::Encode { format, .. }
            | ExportError::Decode { format, .. }
            | ExportError::Store { format, .. } => *format,
        }
    }
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed '{0}' is unavailable")]
    Unavailable(String),

    #[error("Invalid replay script {path}: {details}")]
    Script { path: PathBuf, details: String },

    #[error("Input device error: {details}")]
    Input { details: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DroneScanError>;
