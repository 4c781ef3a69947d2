//! Client-visible logical paths and their resolution under the upload root.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path contains a parent directory component")]
    ParentComponent,
    #[error("path contains NUL byte")]
    NulByte,
    #[error("path segment {0:?} contains a separator")]
    Separator(String),
    #[error("path segment {0:?} contains colon (potential ADS attack)")]
    Colon(String),
    #[error("path escapes root")]
    EscapesRoot,
}

/// Ordered path segments relative to the upload root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalPath {
    segments: Vec<String>,
}

impl LogicalPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a `/`-separated client path. Empty and `.` segments are dropped;
    /// everything else is kept verbatim and validated at resolution time.
    pub fn parse(raw: &str) -> Self {
        Self::new(
            raw.split('/')
                .filter(|s| !s.is_empty() && *s != ".")
                .map(str::to_owned),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Join the segments under `root`, refusing anything that could land
    /// outside it. Existing targets are canonicalized so symlinks are
    /// followed before the containment check; for new files the parent is
    /// canonicalized instead.
    pub async fn resolve(&self, root: &Path) -> Result<PathBuf, PathError> {
        let mut joined = root.to_path_buf();
        for seg in &self.segments {
            if seg == ".." {
                return Err(PathError::ParentComponent);
            }
            if seg.contains('\0') {
                return Err(PathError::NulByte);
            }
            if seg.contains('/') || seg.contains('\\') {
                return Err(PathError::Separator(seg.clone()));
            }
            #[cfg(windows)]
            if seg.contains(':') {
                return Err(PathError::Colon(seg.clone()));
            }
            if !seg.is_empty() && seg != "." {
                joined.push(seg);
            }
        }

        let canon_root = fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf());

        let final_path = if let Ok(canon) = fs::canonicalize(&joined).await {
            canon
        } else if let (Some(parent), Some(name)) = (joined.parent(), joined.file_name()) {
            match fs::canonicalize(parent).await {
                Ok(canon_parent) => canon_parent.join(name),
                // Missing parent: the open will fail with NotFound
                Err(_) => joined,
            }
        } else {
            joined
        };

        if !final_path.starts_with(&canon_root) && !final_path.starts_with(root) {
            return Err(PathError::EscapesRoot);
        }
        Ok(final_path)
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
