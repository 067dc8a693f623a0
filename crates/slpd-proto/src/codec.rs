//! Length-delimited framing for [`RpcMessage`].
//!
//! [`RpcCodec`] is used by the daemon on top of tokio streams;
//! [`write_message`] and [`read_message`] speak the same format over
//! blocking `std::io` streams for clients.

use crate::rpc::RpcMessage;
use bytes::{Bytes, BytesMut};
use prost::Message;
use std::io::{self, Read, Write};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest frame body accepted in either direction (1 MiB).
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Length prefix size in bytes.
const HEADER_LENGTH: usize = 4;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Protobuf decoding error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Frame of {0} bytes exceeds the {MAX_FRAME_LENGTH} byte limit")]
    FrameTooLarge(usize),

    #[error("Unknown RPC message type: {0}")]
    UnknownType(i32),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// tokio-util codec turning length-delimited frames into [`RpcMessage`]s.
#[derive(Debug)]
pub struct RpcCodec {
    frames: LengthDelimitedCodec,
}

impl RpcCodec {
    /// Creates a codec with the default frame limit.
    pub fn new() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .length_field_length(HEADER_LENGTH)
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RpcCodec {
    type Item = RpcMessage;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(RpcMessage::decode(frame.freeze())?)),
            None => Ok(None),
        }
    }
}

impl Encoder<RpcMessage> for RpcCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: RpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.encode_to_vec();
        if body.len() > MAX_FRAME_LENGTH {
            return Err(ProtoError::FrameTooLarge(body.len()));
        }
        self.frames.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}

/// Writes one framed message to a blocking stream.
pub fn write_message<W: Write>(writer: &mut W, message: &RpcMessage) -> Result<(), ProtoError> {
    let body = message.encode_to_vec();
    if body.len() > MAX_FRAME_LENGTH {
        return Err(ProtoError::FrameTooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_LENGTH + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);

    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one framed message from a blocking stream.
pub fn read_message<R: Read>(reader: &mut R) -> Result<RpcMessage, ProtoError> {
    let mut header = [0u8; HEADER_LENGTH];
    reader.read_exact(&mut header)?;

    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_FRAME_LENGTH {
        return Err(ProtoError::FrameTooLarge(length));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(RpcMessage::decode(body.as_slice())?)
}
