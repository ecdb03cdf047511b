//! Producer end of the channel.
//!
//! Writes to a socket whose reader has gone away must come back as an
//! ordinary `BrokenPipe` error instead of a SIGPIPE that kills the capture
//! process.

use std::io::{self, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Opens producer connections to the consumer.
pub trait Connector: Send {
    type Stream: Write + Send;

    fn connect(&self) -> io::Result<Self::Stream>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// Blocking Unix socket stream that never raises SIGPIPE.
#[derive(Debug)]
pub struct FrameStream {
    stream: UnixStream,
}

impl FrameStream {
    /// Connect to the consumer listening at `path`.
    ///
    /// Each write blocks for at most `write_timeout`; a consumer that stops
    /// reading surfaces as `WouldBlock`/`TimedOut`.
    pub fn connect(path: &Path, write_timeout: Duration) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        stream.set_write_timeout(Some(write_timeout))?;
        suppress_sigpipe(&stream)?;
        Ok(Self { stream })
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
        suppress_sigpipe(&stream)?;
        Ok(Self { stream })
    }

    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Write for FrameStream {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the fd is owned by `self.stream` and stays open for the
        // call; the pointer and length come from a live slice.
        let n = unsafe {
            libc::send(
                self.stream.as_raw_fd(),
                buf.as_ptr().cast(),
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn suppress_sigpipe(stream: &UnixStream) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let value: libc::c_int = 1;
    // SAFETY: valid fd, and `value` outlives the call with the size passed.
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            (&value as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn suppress_sigpipe(_stream: &UnixStream) -> io::Result<()> {
    Ok(())
}

/// Connects to the well-known rendezvous socket.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
    write_timeout: Duration,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>, write_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            write_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UnixConnector {
    type Stream = FrameStream;

    fn connect(&self) -> io::Result<FrameStream> {
        FrameStream::connect(&self.path, self.write_timeout)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
