//! Error taxonomy for the write path.
//!
//! `WriteError` is what a protocol engine turns into a negative reply.
//! `ContractViolation` marks a defect in whoever drives the handle/consumer
//! and is never meant to reach a client. Webhook failures have their own
//! type and stay inside the webhook sink.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::path::PathError;
use crate::protocol::reply;

pub type Result<T> = std::result::Result<T, UploadError>;

/// Coarse classification of an OS-level filesystem failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    PermissionDenied,
    NotFound,
    NotADirectory,
    AlreadyExists,
    NoSpace,
    Other,
}

impl FsErrorKind {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => return FsErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => return FsErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => return FsErrorKind::AlreadyExists,
            _ => {}
        }
        #[cfg(unix)]
        if let Some(code) = err.raw_os_error() {
            return match code {
                libc::EACCES | libc::EPERM | libc::EROFS => FsErrorKind::PermissionDenied,
                libc::ENOTDIR => FsErrorKind::NotADirectory,
                libc::ENOSPC | libc::EDQUOT => FsErrorKind::NoSpace,
                _ => FsErrorKind::Other,
            };
        }
        FsErrorKind::Other
    }
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FsErrorKind::PermissionDenied => "permission denied",
            FsErrorKind::NotFound => "no such file or directory",
            FsErrorKind::NotADirectory => "not a directory",
            FsErrorKind::AlreadyExists => "file exists",
            FsErrorKind::NoSpace => "no space left on device",
            FsErrorKind::Other => "filesystem error",
        };
        f.write_str(s)
    }
}

/// Failure to open or write the local destination
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("{}: is a directory", .path.display())]
    IsDirectory { path: PathBuf },

    #[error("{}: {kind}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        kind: FsErrorKind,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },
}

impl WriteError {
    /// Map an OS error raised while touching `path`
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        #[cfg(unix)]
        if source.raw_os_error() == Some(libc::EISDIR) {
            return WriteError::IsDirectory { path };
        }
        let kind = FsErrorKind::classify(&source);
        WriteError::Filesystem { path, kind, source }
    }

    /// Raw OS error code, when there is one
    pub fn code(&self) -> Option<i32> {
        match self {
            WriteError::Filesystem { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<FsErrorKind> {
        match self {
            WriteError::Filesystem { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Client-facing reason, without the server-side absolute path
    pub fn reason(&self) -> String {
        match self {
            WriteError::IsDirectory { .. } => "is a directory".to_string(),
            WriteError::Filesystem { kind, .. } => kind.to_string(),
            WriteError::InvalidPath { source, .. } => source.to_string(),
        }
    }

    /// Negative reply code an engine should send for this failure
    pub fn reply_code(&self) -> u16 {
        match self {
            WriteError::IsDirectory { .. } => reply::FILE_UNAVAILABLE,
            WriteError::InvalidPath { .. } => reply::FILENAME_NOT_ALLOWED,
            WriteError::Filesystem { kind, .. } => match kind {
                FsErrorKind::NoSpace => reply::INSUFFICIENT_STORAGE,
                FsErrorKind::Other => reply::LOCAL_ERROR,
                _ => reply::FILE_UNAVAILABLE,
            },
        }
    }
}

/// Misuse of the handle/consumer/sink state machines by the driving engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("receive() may only be called once per write handle")]
    AlreadyReceived,
    #[error("only streaming (push) producers are supported")]
    PullProducer,
    #[error("a producer is already registered")]
    ProducerAlreadyRegistered,
    #[error("write() before a producer was registered")]
    WriteWithoutProducer,
    #[error("write() after the upload was aborted")]
    WriteAfterAbort,
    #[error("write() after the producer was unregistered")]
    WriteAfterFinish,
    #[error("unregister_producer() before a producer was registered")]
    UnregisterWithoutProducer,
    #[error("unregister_producer() called twice")]
    AlreadyFinished,
    #[error("sink used after it was finished")]
    SinkFinished,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// The producer's byte stream broke before EOF; the upload is incomplete
    #[error("data stream ended early: {0}")]
    Stream(#[source] io::Error),
}

impl UploadError {
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, UploadError::Contract(_))
    }

    pub fn as_contract_violation(&self) -> Option<ContractViolation> {
        match self {
            UploadError::Contract(v) => Some(*v),
            UploadError::Write(_) | UploadError::Stream(_) => None,
        }
    }
}

/// Log a contract violation loudly and turn it into an error
pub(crate) fn violation(v: ContractViolation) -> UploadError {
    tracing::error!(violation = ?v, "write-path contract violation: {}", v);
    UploadError::Contract(v)
}

/// Webhook delivery failure. Reported, never propagated.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook responded with {status}")]
    Status { status: reqwest::StatusCode },
}
