//! # Frame Codec
//!
//! Length-prefixed bincode frames. Every message on a connection is an
//! `Envelope`: a correlation id plus a payload. Requests and responses are
//! matched by id; the two plaintext handshake variants only ever appear
//! before the TLS upgrade.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::commands::{Request, Response};
use crate::error::RpcError;
use crate::MAX_FRAME_LEN;

/// Frame payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    /// Channel-security upgrade request; first frame on every connection.
    StartTls,
    /// Acknowledgement; the next byte on the wire begins the TLS negotiation.
    StartTlsAck,
    /// A command invocation.
    Request(Request),
    /// A successful command result.
    Response(Response),
    /// The responder failed; carries only the rendered message.
    Failure { message: String },
}

/// One frame: correlation id + payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(id: u64, payload: Payload) -> Self {
        Self { id, payload }
    }
}

/// Encode and write one frame.
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = bincode::serialize(envelope).map_err(|e| RpcError::Codec(e.to_string()))?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge {
            len: bytes.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Envelope, RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    bincode::deserialize(&buf).map_err(|e| RpcError::Codec(e.to_string()))
}
