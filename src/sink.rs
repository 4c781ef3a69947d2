//! Destinations for an upload's byte stream.
//!
//! A [`FileSink`] is authoritative: its errors abort the upload. A
//! [`WebhookSink`] is best effort: delivery failures are logged and reported
//! to the [`UploadLogger`] but never returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{violation, ContractViolation, Result, WebhookError, WriteError};
use crate::logger::UploadLogger;

/// Receives a finite ordered byte stream, then a single completion signal
#[async_trait]
pub trait Sink: Send {
    /// Sink name (used for logging)
    fn name(&self) -> &'static str;

    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    async fn finish(&mut self) -> Result<()>;
}

/// Local file destination. Owns the open file until `finish`.
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, file: File) -> Self {
        Self {
            path: path.into(),
            file: Some(file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.file.is_none()
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => return Err(violation(ContractViolation::SinkFinished)),
        };
        file.write_all(chunk)
            .await
            .map_err(|e| WriteError::from_io(self.path.clone(), e))?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        // Taken before flushing so the file is released even if flush fails
        let mut file = self
            .file
            .take()
            .ok_or_else(|| violation(ContractViolation::SinkFinished))?;
        file.flush()
            .await
            .map_err(|e| WriteError::from_io(self.path.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| WriteError::from_io(self.path.clone(), e))?;
        Ok(())
    }
}

/// Immutable webhook target shared by every upload
#[derive(Clone, Debug, Default)]
pub struct Webhook {
    target: Option<Target>,
}

#[derive(Clone, Debug)]
struct Target {
    url: Url,
    client: reqwest::Client,
}

impl Webhook {
    /// A client is only built when there is a URL to post to
    pub fn new(url: Option<Url>, timeout: Duration) -> std::result::Result<Self, WebhookError> {
        let Some(url) = url else {
            return Ok(Self::disabled());
        };
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            target: Some(Target { url, client }),
        })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn url(&self) -> Option<&Url> {
        self.target.as_ref().map(|t| &t.url)
    }

    pub fn sink(&self, path: impl Into<PathBuf>, logger: Arc<dyn UploadLogger>) -> WebhookSink {
        WebhookSink {
            webhook: self.clone(),
            path: path.into(),
            logger,
            delivered: 0,
            failed: 0,
            finished: false,
        }
    }
}

impl Target {
    async fn post(&self, chunk: &[u8]) -> std::result::Result<(), WebhookError> {
        let response = self
            .client
            .post(self.url.clone())
            .body(chunk.to_vec())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status { status });
        }
        Ok(())
    }
}

/// POSTs each chunk to the webhook, if one is configured
pub struct WebhookSink {
    webhook: Webhook,
    path: PathBuf,
    logger: Arc<dyn UploadLogger>,
    delivered: u64,
    failed: u64,
    finished: bool,
}

impl WebhookSink {
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if self.finished {
            return Err(violation(ContractViolation::SinkFinished));
        }
        let Some(target) = self.webhook.target.as_ref() else {
            tracing::debug!("no webhook URL configured; skipping webhook call");
            return Ok(());
        };
        let url = &target.url;
        match target.post(chunk).await {
            Ok(()) => {
                self.delivered += 1;
                tracing::debug!(bytes = chunk.len(), %url, "chunk delivered to webhook");
            }
            Err(e) => {
                self.failed += 1;
                tracing::warn!(
                    bytes = chunk.len(),
                    %url,
                    path = %self.path.display(),
                    "webhook delivery failed: {}",
                    e
                );
                self.logger
                    .webhook_failed(&self.path, chunk.len(), &e.to_string());
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(violation(ContractViolation::SinkFinished));
        }
        self.finished = true;
        if self.failed > 0 {
            tracing::warn!(
                delivered = self.delivered,
                failed = self.failed,
                path = %self.path.display(),
                "upload finished with undelivered webhook chunks"
            );
        }
        Ok(())
    }
}
