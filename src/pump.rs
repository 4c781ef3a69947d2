//! Drive a consumer from a raw byte stream, the way an FTP-style data
//! connection delivers an upload: bytes until EOF, no framing.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::consumer::{Consumer, StopSignal};
use crate::error::{Result, UploadError};

/// Hand one chunk to `consumer` unless it has asked `signal`'s producer to
/// stop. Returns whether the chunk was written; a stopped stream is drained.
pub async fn forward<C>(consumer: &mut C, signal: &StopSignal, chunk: &[u8]) -> Result<bool>
where
    C: Consumer + ?Sized,
{
    if signal.is_stopped() {
        return Ok(false);
    }
    consumer.write(chunk).await?;
    Ok(true)
}

/// Push everything `reader` yields into `consumer`, in reads of at most
/// `chunk_size` bytes. The producer is always unregistered, so the partial
/// file is closed and kept after a sink error or a read error. A read error
/// is returned as `UploadError::Stream`.
pub async fn pump<R, C>(reader: &mut R, consumer: &mut C, chunk_size: usize) -> Result<u64>
where
    R: AsyncRead + Unpin,
    C: Consumer + ?Sized,
{
    let signal = StopSignal::new();
    consumer.register_producer(Box::new(signal.clone()), true)?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    let mut failure: Option<UploadError> = None;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(bytes = total, "data stream ended early: {}", e);
                failure = Some(UploadError::Stream(e));
                break;
            }
        };
        match forward(&mut *consumer, &signal, &buf[..n]).await {
            Ok(true) => total += n as u64,
            Ok(false) => break,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    let closed = consumer.unregister_producer().await;
    match failure {
        Some(e) => Err(e),
        None => closed.map(|_| total),
    }
}
