//! One-shot write handle handed to the engine by the resolver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::consumer::{Consumer, FanOutConsumer};
use crate::error::{violation, ContractViolation, Result};
use crate::logger::UploadLogger;
use crate::sink::{FileSink, Sink, Webhook};

/// What an engine holds between a successful open and the data transfer
pub trait WriteFile: Send {
    type Consumer: Consumer;

    /// Produce the consumer for this upload. Legal exactly once.
    fn receive(&mut self) -> Result<Self::Consumer>;

    /// Release the handle. Resource teardown belongs to the consumer.
    fn close(&mut self) -> Result<()>;
}

enum HandleState {
    Unconsumed(FileSink),
    Consumed,
}

pub struct WriteHandle {
    path: PathBuf,
    state: HandleState,
    webhook: Webhook,
    logger: Arc<dyn UploadLogger>,
}

impl WriteHandle {
    pub fn new(file: FileSink, webhook: Webhook, logger: Arc<dyn UploadLogger>) -> Self {
        Self {
            path: file.path().to_path_buf(),
            state: HandleState::Unconsumed(file),
            webhook,
            logger,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self.state, HandleState::Consumed)
    }
}

impl WriteFile for WriteHandle {
    type Consumer = FanOutConsumer;

    fn receive(&mut self) -> Result<FanOutConsumer> {
        let file = match std::mem::replace(&mut self.state, HandleState::Consumed) {
            HandleState::Unconsumed(file) => file,
            HandleState::Consumed => return Err(violation(ContractViolation::AlreadyReceived)),
        };
        let webhook = self.webhook.sink(self.path.clone(), self.logger.clone());
        let sinks: Vec<Box<dyn Sink>> = vec![Box::new(file), Box::new(webhook)];
        Ok(FanOutConsumer::new(
            self.path.clone(),
            sinks,
            self.logger.clone(),
        ))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
