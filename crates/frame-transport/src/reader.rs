//! Async frame reader used on the consumer side.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use castbridge_common::error::{CastError, CastResult};

use crate::frame::{FrameHeader, FrameMessage, HEADER_LEN};

/// Reads length-prefixed frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: u32,
    frames_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: u32) -> Self {
        Self {
            inner,
            max_frame_bytes,
            frames_read: 0,
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` only when the stream ends exactly on a frame
    /// boundary. Ending anywhere inside a header or payload is a
    /// [`CastError::ProtocolViolation`]; after one, the stream must be
    /// dropped.
    pub async fn next_frame(&mut self) -> CastResult<Option<FrameMessage>> {
        let mut header_bytes = [0u8; HEADER_LEN];
        let got = read_full(&mut self.inner, &mut header_bytes).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(CastError::protocol(HEADER_LEN, got));
        }

        let header = FrameHeader::decode(&header_bytes);
        header.validate(self.max_frame_bytes)?;

        let mut payload = vec![0u8; header.payload_len()];
        let got = read_full(&mut self.inner, &mut payload).await?;
        if got < payload.len() {
            return Err(CastError::protocol(
                header.total_length as usize,
                HEADER_LEN + got,
            ));
        }

        self.frames_read += 1;
        Ok(Some(FrameMessage {
            width: header.width,
            height: header.height,
            orientation: header.orientation,
            payload,
        }))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Fill `buf` until it is full or the stream ends. Returns bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
