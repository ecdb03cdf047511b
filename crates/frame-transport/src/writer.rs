//! Blocking frame writer used on the capture side.

use std::io::{self, Write};

use crate::frame::FrameHeader;

/// A write that stopped before every byte was accepted.
#[derive(Debug, thiserror::Error)]
#[error("write stopped after {bytes_written} of {bytes_total} bytes: {source}")]
pub struct PartialWrite {
    pub bytes_written: usize,
    pub bytes_total: usize,
    #[source]
    pub source: io::Error,
}

/// Write all of `buf`, looping over short writes.
///
/// `Interrupted` is retried transparently. A zero-length write is treated
/// as the peer having stopped reading.
pub fn write_fully<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> Result<(), PartialWrite> {
    let mut sent = 0;
    while sent < buf.len() {
        match writer.write(&buf[sent..]) {
            Ok(0) => {
                return Err(PartialWrite {
                    bytes_written: sent,
                    bytes_total: buf.len(),
                    source: io::Error::new(io::ErrorKind::WriteZero, "channel accepted no bytes"),
                })
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PartialWrite {
                    bytes_written: sent,
                    bytes_total: buf.len(),
                    source: e,
                })
            }
        }
    }
    Ok(())
}

/// Failure to send one frame.
#[derive(Debug, thiserror::Error)]
#[error("frame send failed after {bytes_written} bytes: {source}")]
pub struct SendError {
    /// Bytes of this frame that did reach the channel.
    pub bytes_written: usize,
    #[source]
    pub source: io::Error,
}

impl SendError {
    /// Part of the frame went out, so the stream no longer starts on a
    /// frame boundary and must be discarded.
    pub fn desynced(&self) -> bool {
        self.bytes_written > 0
    }

    pub fn is_broken_pipe(&self) -> bool {
        matches!(
            self.source.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
        )
    }
}

/// Writes framed messages to a byte stream.
pub struct FrameWriter<W: Write> {
    inner: W,
    frames_written: u64,
    bytes_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    /// Send header then payload. Nothing is buffered on failure.
    pub fn send(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<(), SendError> {
        debug_assert_eq!(header.payload_len(), payload.len());

        write_fully(&mut self.inner, &header.encode()).map_err(|e| SendError {
            bytes_written: e.bytes_written,
            source: e.source,
        })?;
        write_fully(&mut self.inner, payload).map_err(|e| SendError {
            bytes_written: crate::frame::HEADER_LEN + e.bytes_written,
            source: e.source,
        })?;

        self.frames_written += 1;
        self.bytes_written += header.total_length as u64;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
