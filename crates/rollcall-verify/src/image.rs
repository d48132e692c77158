//! Durable storage for captured images

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::{VerifyError, VerifyResult};

/// Persists image bytes and hands back a reference the face matcher can read
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `bytes`; `extension` is the file type without a dot, e.g. `jpg`
    async fn store(&self, bytes: &[u8], extension: &str) -> VerifyResult<String>;
}

/// Writes images as `<dir>/<uuid>.<ext>` and returns `file://` URLs
#[derive(Debug, Clone)]
pub struct FsImageStore {
    dir: PathBuf,
}

impl FsImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn store(&self, bytes: &[u8], extension: &str) -> VerifyResult<String> {
        if bytes.is_empty() {
            return Err(VerifyError::InvalidInput("image is empty".into()));
        }
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VerifyError::InvalidInput(format!(
                "unsupported image extension '{}'",
                extension
            )));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = std::path::absolute(self.dir.join(format!("{}.{}", Uuid::new_v4(), extension)))?;
        tokio::fs::write(&path, bytes).await?;

        debug!(path = %path.display(), size = bytes.len(), "Image stored");
        Ok(format!("file://{}", path.display()))
    }
}
