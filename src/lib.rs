//! uptee library
//!
//! Write path of an upload daemon: every uploaded file is streamed to local
//! storage and, chunk by chunk, to an optional HTTP webhook.

pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod handle;
pub mod logger;
pub mod path;
pub mod protocol;
pub mod pump;
pub mod resolver;
pub mod server;
pub mod sink;

pub use consumer::{Consumer, FanOutConsumer, Producer, StopSignal};
pub use error::{ContractViolation, UploadError, WriteError};
pub use handle::{WriteFile, WriteHandle};
pub use path::LogicalPath;
pub use resolver::WritePathResolver;
pub use sink::{FileSink, Sink, Webhook, WebhookSink};
