use super::ArtifactStore;
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Artifact store double that refuses chosen extensions and keeps everything else in memory
pub(crate) struct FaultyArtifactStore {
    failing_extensions: Mutex<Vec<&'static str>>,
    pub(crate) written: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FaultyArtifactStore {
    pub(crate) fn failing(extension: &'static str) -> Self {
        Self {
            failing_extensions: Mutex::new(vec![extension]),
            written: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_all() -> Self {
        let store = Self::failing(".json");
        store.failing_extensions.lock().push(".csv");
        store
    }

    /// Accept every write from now on
    pub(crate) fn recover(&self) {
        self.failing_extensions.lock().clear();
    }
}

#[async_trait]
impl ArtifactStore for FaultyArtifactStore {
    fn location(&self) -> &Path {
        Path::new("/faulty")
    }

    async fn write(&self, file_name: &str, contents: Vec<u8>) -> Result<PathBuf, StorageError> {
        let refused = self
            .failing_extensions
            .lock()
            .iter()
            .any(|ext| file_name.ends_with(ext));
        if refused {
            return Err(StorageError::Fault(format!("disk full writing {}", file_name)));
        }
        self.written.lock().push((file_name.to_string(), contents));
        Ok(self.location().join(file_name))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::Fault(format!("no reads from {}", path.display())))
    }

    async fn list(&self, _prefix: &str, _extension: &str) -> Result<Vec<PathBuf>, StorageError> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> Result<usize, StorageError> {
        Ok(0)
    }
}
