//! Frame reader and writer over the two halves of a byte stream.
//!
//! The reader owns the ingress keystream and MAC, the writer the egress
//! ones. Each half is owned by exactly one task at a time; the writer is
//! shared behind a mutex so whole frames are never interleaved.

use crate::domain::{
    encode_disconnect, DisconnectReason, FrameDecoder, FrameEncoder, Message, RlpxError,
    TransportError, DISCONNECT, FRAME_HEADER_SIZE,
};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Read half of a session stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a session stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Fill `buf` completely, mapping a clean EOF to `TransportError::Closed`.
pub(crate) async fn read_full(reader: &mut BoxedReader, buf: &mut [u8]) -> Result<(), TransportError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Err(e) => Err(TransportError::Io(e)),
    }
}

// =============================================================================
// READER
// =============================================================================

/// Reads and authenticates whole frames.
pub struct FrameReader {
    stream: BoxedReader,
    decoder: FrameDecoder,
}

impl FrameReader {
    /// Wrap a stream half with its decoder.
    pub fn new(stream: BoxedReader, decoder: FrameDecoder) -> Self {
        Self { stream, decoder }
    }

    /// Wait for one complete frame.
    ///
    /// Not cancellation safe: dropping the future mid-frame loses the bytes
    /// already read, so callers either await it to completion or abandon
    /// the reader.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the session.
    pub async fn read_msg(&mut self) -> Result<Message, RlpxError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        read_full(&mut self.stream, &mut header).await?;
        let body_len = self.decoder.decode_header(&header)?;

        let mut body = vec![0u8; body_len];
        read_full(&mut self.stream, &mut body).await?;
        let message = self.decoder.decode_body(&body)?;

        trace!(code = message.code, size = message.size, "frame received");
        Ok(message)
    }

    /// [`read_msg`](Self::read_msg) with a tighter size limit for one frame.
    ///
    /// An oversized header is rejected before any of its body is read.
    ///
    /// # Errors
    ///
    /// As `read_msg`; `ProtocolError::FrameTooLarge` above `limit`.
    pub async fn read_msg_within(&mut self, limit: usize) -> Result<Message, RlpxError> {
        let previous = self.decoder.replace_max_frame_size(limit);
        let result = self.read_msg().await;
        self.decoder.replace_max_frame_size(previous);
        result
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Encrypts and writes whole frames.
pub struct FrameWriter {
    stream: BoxedWriter,
    encoder: FrameEncoder,
    closed: bool,
}

impl FrameWriter {
    /// Wrap a stream half with its encoder.
    pub fn new(stream: BoxedWriter, encoder: FrameEncoder) -> Self {
        Self {
            stream,
            encoder,
            closed: false,
        }
    }

    /// Encode and flush one frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` after a `Disconnect` was sent or the
    /// writer was shut down, and any encoding or I/O failure otherwise.
    pub async fn send(&mut self, code: u64, payload: &[u8]) -> Result<(), RlpxError> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        let frame = self.encoder.encode_frame(code, payload)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        trace!(code, size = payload.len(), "frame sent");
        Ok(())
    }

    /// Send `Disconnect` as the final frame; later sends fail.
    ///
    /// # Errors
    ///
    /// Returns the I/O failure, if any. The writer is closed either way.
    pub async fn send_disconnect(&mut self, reason: DisconnectReason) -> Result<(), RlpxError> {
        let result = self.send(DISCONNECT, &encode_disconnect(reason)).await;
        self.closed = true;
        result
    }

    /// Whether no further frames may be sent.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the write half of the stream.
    pub async fn shutdown(&mut self) {
        self.closed = true;
        // Peer may already be gone
        let _ = self.stream.shutdown().await;
    }
}
