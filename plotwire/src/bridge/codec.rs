//! Wire framing between [`RpcClient`](crate::rpc::RpcClient) and the server.
//!
//! A frame carries exactly one [`RpcRequest`](super::protocol::RpcRequest) or
//! [`RpcResponse`](super::protocol::RpcResponse) envelope as JSON, behind a
//! 4-byte big-endian byte count. Array payloads ride inside the envelope as
//! base64 unless the staging area moved them out to `.dsr` files, in which
//! case only the file path is framed.

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest envelope either side will accept. A peer announcing more is
/// treated as a protocol error and the connection is dropped.
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Envelopes this large usually mean arrays that should have been staged.
const LARGE_FRAME_BYTES: usize = 1024 * 1024;

/// Frames envelopes of type `T`. The client reads responses and writes
/// requests; the server does the opposite.
pub struct FrameCodec<T> {
    framing: LengthDelimitedCodec,
    _envelope: PhantomData<T>,
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameCodec<T> {
    pub fn new() -> Self {
        Self {
            framing: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(MAX_FRAME_BYTES)
                .new_codec(),
            _envelope: PhantomData,
        }
    }
}

fn invalid_envelope(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

impl<T: DeserializeOwned> Decoder for FrameCodec<T> {
    type Item = T;
    type Error = io::Error;

    /// `Ok(None)` until a whole frame is buffered. A frame that is not a valid
    /// envelope fails with [`io::ErrorKind::InvalidData`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, io::Error> {
        let Some(frame) = self.framing.decode(src)? else {
            return Ok(None);
        };
        serde_json::from_slice(&frame).map(Some).map_err(invalid_envelope)
    }
}

impl<T: Serialize> Encoder<T> for FrameCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, envelope: T, dst: &mut BytesMut) -> Result<(), io::Error> {
        let json = serde_json::to_vec(&envelope).map_err(invalid_envelope)?;
        let frame_bytes = json.len();
        if frame_bytes > LARGE_FRAME_BYTES {
            tracing::info!(
                frame_bytes,
                frame_kb = frame_bytes / 1024,
                "Large envelope; consider lowering the staging threshold"
            );
        } else {
            tracing::trace!(frame_bytes, "Encoding envelope");
        }
        self.framing.encode(Bytes::from(json), dst)
    }
}
