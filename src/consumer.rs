//! Push-based producer/consumer contract and the fan-out consumer.
//!
//! The engine registers a streaming producer, pushes chunks with `write`,
//! and signals the end of the stream with `unregister_producer`. The
//! consumer never pulls: backpressure is the engine awaiting each `write`.
//!
//! ```text
//! Idle --register_producer--> Streaming --unregister_producer--> Finished
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{violation, ContractViolation, Result, UploadError};
use crate::logger::UploadLogger;
use crate::sink::Sink;

/// The engine side of a stream
pub trait Producer: Send {
    /// Ask the producer to stop pushing data. Called when the upload can no
    /// longer succeed.
    fn stop_producing(&mut self);
}

/// The consumer side of a stream
#[async_trait]
pub trait Consumer: Send {
    fn register_producer(&mut self, producer: Box<dyn Producer>, streaming: bool) -> Result<()>;

    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    async fn unregister_producer(&mut self) -> Result<()>;
}

/// Shared stop flag; the clone handed to the consumer raises it, the engine
/// polls it between chunks.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Producer for StopSignal {
    fn stop_producing(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Finished,
}

/// Forwards every chunk to each sink in order before returning.
///
/// The first sink is authoritative: any error it (or any other sink)
/// returns aborts the upload. Best-effort sinks swallow their own failures.
pub struct FanOutConsumer {
    path: PathBuf,
    sinks: Vec<Box<dyn Sink>>,
    producer: Option<Box<dyn Producer>>,
    state: StreamState,
    aborted: bool,
    bytes: u64,
    chunks: u64,
    logger: Arc<dyn UploadLogger>,
}

impl FanOutConsumer {
    pub fn new(
        path: impl Into<PathBuf>,
        sinks: Vec<Box<dyn Sink>>,
        logger: Arc<dyn UploadLogger>,
    ) -> Self {
        Self {
            path: path.into(),
            sinks,
            producer: None,
            state: StreamState::Idle,
            aborted: false,
            bytes: 0,
            chunks: 0,
            logger,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    fn abort(&mut self, sink: &str, err: &UploadError) {
        self.aborted = true;
        tracing::error!(sink, path = %self.path.display(), "upload aborted: {}", err);
        self.logger.error(sink, &self.path, &err.to_string());
        if let Some(producer) = self.producer.as_mut() {
            producer.stop_producing();
        }
    }
}

#[async_trait]
impl Consumer for FanOutConsumer {
    fn register_producer(&mut self, producer: Box<dyn Producer>, streaming: bool) -> Result<()> {
        if self.state != StreamState::Idle {
            return Err(violation(ContractViolation::ProducerAlreadyRegistered));
        }
        if !streaming {
            return Err(violation(ContractViolation::PullProducer));
        }
        self.producer = Some(producer);
        self.state = StreamState::Streaming;
        Ok(())
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match self.state {
            StreamState::Idle => return Err(violation(ContractViolation::WriteWithoutProducer)),
            StreamState::Finished => return Err(violation(ContractViolation::WriteAfterFinish)),
            StreamState::Streaming => {}
        }
        if self.aborted {
            return Err(violation(ContractViolation::WriteAfterAbort));
        }

        for i in 0..self.sinks.len() {
            if let Err(e) = self.sinks[i].write(chunk).await {
                let name = self.sinks[i].name();
                self.abort(name, &e);
                return Err(e);
            }
        }
        self.bytes += chunk.len() as u64;
        self.chunks += 1;
        tracing::debug!(bytes = chunk.len(), total = self.bytes, "chunk relayed");
        Ok(())
    }

    async fn unregister_producer(&mut self) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                return Err(violation(ContractViolation::UnregisterWithoutProducer))
            }
            StreamState::Finished => return Err(violation(ContractViolation::AlreadyFinished)),
            StreamState::Streaming => {}
        }
        self.state = StreamState::Finished;
        self.producer = None;

        // Every sink gets its finish call; the first error wins
        let mut first_err = None;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.finish().await {
                tracing::error!(sink = sink.name(), path = %self.path.display(), "finish failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        if let Some(e) = first_err {
            self.logger.error("finish", &self.path, &e.to_string());
            return Err(e);
        }

        self.logger.finished(&self.path, self.bytes, self.chunks);
        if self.aborted {
            tracing::info!(bytes = self.bytes, path = %self.path.display(), "partial upload closed");
        } else {
            tracing::info!(bytes = self.bytes, chunks = self.chunks, path = %self.path.display(), "upload stored");
        }
        Ok(())
    }
}
