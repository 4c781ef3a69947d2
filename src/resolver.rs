//! Decides whether an upload may proceed and opens its destination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;

use crate::error::WriteError;
use crate::handle::WriteHandle;
use crate::logger::UploadLogger;
use crate::path::LogicalPath;
use crate::sink::{FileSink, Webhook};

pub struct WritePathResolver {
    root: PathBuf,
    webhook: Webhook,
    logger: Arc<dyn UploadLogger>,
}

impl WritePathResolver {
    pub fn new(root: impl Into<PathBuf>, webhook: Webhook, logger: Arc<dyn UploadLogger>) -> Self {
        Self {
            root: root.into(),
            webhook,
            logger,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn webhook(&self) -> &Webhook {
        &self.webhook
    }

    /// Open `path` for writing, truncating any existing file.
    pub async fn open(&self, path: &LogicalPath) -> Result<WriteHandle, WriteError> {
        let target = path
            .resolve(&self.root)
            .await
            .map_err(|source| WriteError::InvalidPath {
                path: path.to_string(),
                source,
            })?;

        // Checked up front: Windows reports EACCES, not EISDIR, when opening a
        // directory for writing
        if let Ok(meta) = tokio::fs::metadata(&target).await {
            if meta.is_dir() {
                return Err(WriteError::IsDirectory { path: target });
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target)
            .await
            .map_err(|e| WriteError::from_io(target.clone(), e))?;

        tracing::debug!(path = %target.display(), "opened for writing");
        self.logger.opened(&target);
        Ok(WriteHandle::new(
            FileSink::new(target, file),
            self.webhook.clone(),
            self.logger.clone(),
        ))
    }
}
