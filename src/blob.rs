use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{GatewayError, Result};

/// Where uploads wait while snf-server scans them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under a unique name and return its path.
    async fn store(&self, bytes: Vec<u8>) -> Result<PathBuf>;

    async fn delete(&self, path: &Path) -> io::Result<()>;
}

/// Stores uploads as `snf-XXXXXX` files in a directory snf-server can read.
#[derive(Debug, Clone)]
pub struct TempDirBlobStore {
    dir: PathBuf,
}

impl TempDirBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl BlobStore for TempDirBlobStore {
    async fn store(&self, bytes: Vec<u8>) -> Result<PathBuf> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> io::Result<PathBuf> {
            let mut file = tempfile::Builder::new()
                .prefix("snf-")
                .tempfile_in(&dir)?;
            file.write_all(&bytes)?;
            file.flush()?;
            let (_, path) = file.keep().map_err(|e| e.error)?;
            Ok(path)
        })
        .await
        .map_err(|e| GatewayError::BlobStore(e.to_string()))?
        .map_err(|e| GatewayError::BlobStore(format!("{}: {e}", self.dir.display())))
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}
