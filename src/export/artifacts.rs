use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Filesystem collaborator that owns exported artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Folder every artifact lives in
    fn location(&self) -> &Path;

    /// Write an artifact, replacing any file with the same name
    async fn write(&self, file_name: &str, contents: Vec<u8>) -> Result<PathBuf, StorageError>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Artifacts named `<prefix>*.<extension>`, newest modification time first
    async fn list(&self, prefix: &str, extension: &str) -> Result<Vec<PathBuf>, StorageError>;

    /// Delete every artifact, returning how many files were removed
    async fn clear(&self) -> Result<usize, StorageError>;
}

/// Artifact store backed by a single folder on the local filesystem
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    folder: PathBuf,
}

impl FsArtifactStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    async fn ensure_folder(&self) -> Result<(), StorageError> {
        if !self.folder.exists() {
            fs::create_dir_all(&self.folder)
                .await
                .map_err(|source| StorageError::DirectoryCreation {
                    path: self.folder.clone(),
                    source,
                })?;
            info!("Created artifact folder: {}", self.folder.display());
        }
        Ok(())
    }

    /// Reject names that would escape the folder
    fn artifact_path(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        let candidate = Path::new(file_name);
        if candidate.components().count() != 1 || candidate.file_name().is_none() {
            return Err(StorageError::OutsideFolder(self.folder.join(file_name)));
        }
        Ok(self.folder.join(candidate))
    }

    async fn read_entries(&self) -> Result<Vec<(PathBuf, SystemTime)>, StorageError> {
        let mut files = Vec::new();

        let mut entries = match fs::read_dir(&self.folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.folder.clone(),
                    source,
                })
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::Read {
                path: self.folder.clone(),
                source,
            })?
        {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    continue;
                }
            };

            if metadata.is_file() {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((path, modified));
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn location(&self) -> &Path {
        &self.folder
    }

    async fn write(&self, file_name: &str, contents: Vec<u8>) -> Result<PathBuf, StorageError> {
        self.ensure_folder().await?;
        let path = self.artifact_path(file_name)?;

        fs::write(&path, contents)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        debug!("Wrote artifact {}", path.display());
        Ok(path)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        fs::read(path).await.map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn list(&self, prefix: &str, extension: &str) -> Result<Vec<PathBuf>, StorageError> {
        let suffix = format!(".{}", extension);
        let mut files: Vec<_> = self
            .read_entries()
            .await?
            .into_iter()
            .filter(|(path, _)| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| name.starts_with(prefix) && name.ends_with(&suffix))
                    .unwrap_or(false)
            })
            .collect();

        files.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(files.into_iter().map(|(path, _)| path).collect())
    }

    async fn clear(&self) -> Result<usize, StorageError> {
        let mut removed = 0;

        for (path, _) in self.read_entries().await? {
            fs::remove_file(&path)
                .await
                .map_err(|source| StorageError::Delete {
                    path: path.clone(),
                    source,
                })?;
            removed += 1;
        }

        info!(
            "Removed {} artifacts from {}",
            removed,
            self.folder.display()
        );
        Ok(removed)
    }
}
