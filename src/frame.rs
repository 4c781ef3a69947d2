//! Frame codec for the reference upload listener
//!
//! Header: MAGIC (4) | VERSION (2) | TYPE (1) | LENGTH (4), little endian.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{frame, HEADER_LEN, MAGIC, MAX_FRAME_SIZE, VERSION};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid magic in frame header")]
    BadMagic,
    #[error("protocol version mismatch: got {got}, expected {expected}")]
    Version { got: u16, expected: u16 },
    #[error("frame payload too large: {0} bytes (max: {max})", max = MAX_FRAME_SIZE)]
    TooLarge(usize),
    #[error("malformed reply payload")]
    BadReply,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Peer closed the connection cleanly between frames
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

pub fn validate_frame_size(size: usize) -> Result<(), FrameError> {
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(size));
    }
    Ok(())
}

pub fn build_frame_header(frame_type: u8, payload_len: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header[6] = frame_type;
    header[7..11].copy_from_slice(&payload_len.to_le_bytes());
    header
}

/// Returns: (frame_type, payload_length)
pub fn parse_frame_header(header: &[u8; HEADER_LEN]) -> Result<(u8, u32), FrameError> {
    if &header[0..4] != MAGIC {
        return Err(FrameError::BadMagic);
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(FrameError::Version {
            got: version,
            expected: VERSION,
        });
    }
    let frame_type = header[6];
    let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
    Ok((frame_type, payload_len))
}

pub async fn read_frame<S>(stream: &mut S) -> Result<(u8, Vec<u8>), FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut hdr = [0u8; HEADER_LEN];
    stream.read_exact(&mut hdr).await?;
    let (typ, len) = parse_frame_header(&hdr)?;
    let len = len as usize;
    validate_frame_size(len)?;
    let mut payload = vec![0u8; len];
    if len > 0 {
        stream.read_exact(&mut payload).await?;
    }
    Ok((typ, payload))
}

pub async fn write_frame<S>(stream: &mut S, t: u8, payload: &[u8]) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    validate_frame_size(payload.len())?;
    let hdr = build_frame_header(t, payload.len() as u32);
    stream.write_all(&hdr).await?;
    if !payload.is_empty() {
        stream.write_all(payload).await?;
    }
    stream.flush().await?;
    Ok(())
}

/// Server reply: a numeric code plus human readable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_positive(&self) -> bool {
        crate::protocol::reply::is_positive(self.code)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.message.len());
        out.extend_from_slice(&self.code.to_le_bytes());
        out.extend_from_slice(self.message.as_bytes());
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < 2 {
            return Err(FrameError::BadReply);
        }
        let code = u16::from_le_bytes([payload[0], payload[1]]);
        let message = String::from_utf8_lossy(&payload[2..]).into_owned();
        Ok(Self { code, message })
    }
}

pub async fn write_reply<S>(stream: &mut S, reply: &Reply) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    write_frame(stream, frame::REPLY, &reply.encode()).await
}
