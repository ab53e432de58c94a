//! Local filesystem backend

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Storage, StorageBackend, StorageError, StorageResult};

/// Writes partition paths under a root directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Storage rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a relative partition path
    pub fn full_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn location(&self, relative: &str) -> String {
        self.full_path(relative).display().to_string()
    }

    async fn put(&self, relative: &str, body: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.full_path(relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        tokio::fs::write(&path, &body)
            .await
            .map_err(|source| StorageError::Io {
                path: path.display().to_string(),
                source,
            })?;

        debug!(path = %path.display(), bytes = body.len(), "Wrote file");
        Ok(())
    }
}
