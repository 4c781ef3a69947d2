//! Reference upload listener.
//!
//! Plays the protocol-engine role over a small framed transport: one
//! control connection carries `STOR` requests and the data frames of each
//! upload. It drives the write path exactly as an engine must: open, receive
//! once, register a streaming producer, push chunks, unregister.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

use crate::consumer::{Consumer, StopSignal};
use crate::error::{UploadError, WriteError};
use crate::frame::{read_frame, write_reply, Reply};
use crate::handle::WriteFile;
use crate::path::LogicalPath;
use crate::protocol::{frame, reply};
use crate::pump::forward;
use crate::resolver::WritePathResolver;

enum Incoming {
    Frame(u8, Vec<u8>),
    Closed,
    IdleTimeout,
}

/// What the connection loop does after an upload
enum Flow {
    Continue,
    Close,
}

/// How the data phase of an upload ended
enum Outcome {
    Completed,
    Aborted,
    OutOfSequence,
    Disconnected,
    TimedOut,
    Broken(anyhow::Error),
}

async fn next_frame<S>(stream: &mut S, idle: Duration) -> Result<Incoming>
where
    S: AsyncRead + Unpin,
{
    match timeout(idle, read_frame(stream)).await {
        Err(_) => Ok(Incoming::IdleTimeout),
        Ok(Ok((typ, payload))) => Ok(Incoming::Frame(typ, payload)),
        Ok(Err(e)) if e.is_eof() => Ok(Incoming::Closed),
        Ok(Err(e)) => Err(e).context("read frame"),
    }
}

async fn send<S>(stream: &mut S, code: u16, message: impl Into<String>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reply = Reply::new(code, message);
    tracing::debug!(code, message = %reply.message, "reply");
    write_reply(stream, &reply).await.context("write reply")?;
    Ok(())
}

async fn refuse<S>(stream: &mut S, path: &LogicalPath, err: &WriteError) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    send(stream, err.reply_code(), format!("{}: {}", path, err.reason())).await
}

pub struct UploadServer {
    resolver: Arc<WritePathResolver>,
    idle_timeout: Duration,
}

impl UploadServer {
    pub fn new(resolver: WritePathResolver, idle_timeout: Duration) -> Self {
        Self {
            resolver: Arc::new(resolver),
            idle_timeout,
        }
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            root = %self.resolver.root().display(),
            webhook = self.resolver.webhook().url().map(|u| u.as_str()).unwrap_or("disabled"),
            "upload daemon listening"
        );
        loop {
            let (mut stream, peer) = listener.accept().await?;
            let _ = stream.set_nodelay(true);
            tracing::debug!(%peer, "connection accepted");
            let resolver = self.resolver.clone();
            let idle = self.idle_timeout;
            tokio::spawn(
                async move {
                    if let Err(e) = handle_connection(&mut stream, &resolver, idle).await {
                        tracing::error!("connection terminated: {:#}", e);
                    }
                }
                .instrument(tracing::info_span!("conn", %peer)),
            );
        }
    }
}

pub async fn serve(bind: &str, resolver: WritePathResolver, idle_timeout: Duration) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    UploadServer::new(resolver, idle_timeout).serve(listener).await
}

/// Serve one control connection until QUIT, disconnect, or idle timeout.
/// An `Err` means the connection was torn down because of a broken frame
/// stream or a write-path contract violation.
pub async fn handle_connection<S>(
    stream: &mut S,
    resolver: &WritePathResolver,
    idle: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let (typ, payload) = match next_frame(stream, idle).await? {
            Incoming::Frame(typ, payload) => (typ, payload),
            Incoming::Closed => return Ok(()),
            Incoming::IdleTimeout => {
                let _ = send(stream, reply::SERVICE_CLOSING, "Timeout; closing connection").await;
                return Ok(());
            }
        };
        match typ {
            frame::STOR => {
                let Ok(raw) = std::str::from_utf8(&payload) else {
                    send(stream, reply::SYNTAX_ERROR, "Path is not valid UTF-8").await?;
                    continue;
                };
                let path = LogicalPath::parse(raw);
                let span = tracing::info_span!("upload", session = %Uuid::new_v4(), path = %path);
                match store(stream, resolver, &path, idle).instrument(span).await? {
                    Flow::Continue => {}
                    Flow::Close => return Ok(()),
                }
            }
            frame::QUIT => {
                send(stream, reply::GOODBYE, "Goodbye.").await?;
                return Ok(());
            }
            frame::DATA | frame::END | frame::ABORT => {
                send(stream, reply::BAD_SEQUENCE, "Bad sequence of commands").await?;
            }
            other => {
                send(stream, reply::UNKNOWN_COMMAND, format!("Unknown frame type {}", other)).await?;
            }
        }
    }
}

async fn store<S>(
    stream: &mut S,
    resolver: &WritePathResolver,
    path: &LogicalPath,
    idle: Duration,
) -> Result<Flow>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut handle = match resolver.open(path).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::info!("open refused: {}", e);
            refuse(stream, path, &e).await?;
            return Ok(Flow::Continue);
        }
    };
    send(stream, reply::OPENING_DATA, format!("Opening data stream for {}", path)).await?;

    let mut consumer = handle.receive()?;
    let signal = StopSignal::new();
    consumer.register_producer(Box::new(signal.clone()), true)?;

    let mut failure: Option<WriteError> = None;
    let outcome = loop {
        let (typ, payload) = match next_frame(stream, idle).await {
            Ok(Incoming::Frame(typ, payload)) => (typ, payload),
            Ok(Incoming::Closed) => break Outcome::Disconnected,
            Ok(Incoming::IdleTimeout) => break Outcome::TimedOut,
            Err(e) => break Outcome::Broken(e),
        };
        match typ {
            // Once the consumer has stopped us, frames are drained until the
            // client ends the upload
            frame::DATA => match forward(&mut consumer, &signal, &payload).await {
                Ok(_) => {}
                Err(UploadError::Write(e)) => failure = Some(e),
                Err(e) => return Err(e.into()),
            },
            frame::END => break Outcome::Completed,
            frame::ABORT => break Outcome::Aborted,
            _ => break Outcome::OutOfSequence,
        }
    };

    // The one place the file gets closed, whatever ended the stream
    let closed = consumer.unregister_producer().await;
    handle.close()?;
    let failure = match closed {
        Ok(()) => failure,
        Err(UploadError::Write(e)) => failure.or(Some(e)),
        Err(e) => return Err(e.into()),
    };

    match outcome {
        Outcome::Completed | Outcome::Aborted if failure.is_some() => {
            if let Some(e) = failure {
                tracing::warn!("upload failed: {}", e);
                refuse(stream, path, &e).await?;
            }
            Ok(Flow::Continue)
        }
        Outcome::Completed => {
            send(stream, reply::TRANSFER_COMPLETE, "Transfer complete").await?;
            Ok(Flow::Continue)
        }
        Outcome::Aborted => {
            tracing::info!("upload aborted by client; partial file kept");
            send(stream, reply::TRANSFER_ABORTED, "Transfer aborted; partial file kept").await?;
            Ok(Flow::Continue)
        }
        Outcome::OutOfSequence => {
            send(
                stream,
                reply::BAD_SEQUENCE,
                "Bad sequence of commands; transfer aborted",
            )
            .await?;
            Ok(Flow::Continue)
        }
        Outcome::Disconnected => {
            tracing::warn!("client disconnected mid-upload; partial file kept");
            Ok(Flow::Close)
        }
        Outcome::TimedOut => {
            tracing::warn!("upload idle timeout; partial file kept");
            let _ = send(stream, reply::SERVICE_CLOSING, "Timeout; closing connection").await;
            Ok(Flow::Close)
        }
        Outcome::Broken(e) => Err(e),
    }
}
