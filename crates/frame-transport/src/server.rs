//! Consumer end of the channel.
//!
//! Exactly one producer is served at a time. A producer that closes the
//! socket on a frame boundary has ended the session and the server reports
//! [`TerminationSource::ChannelClosed`]. A producer whose stream breaks
//! mid-frame is disconnected as a protocol violation and is expected to
//! reconnect; that is not a termination.
//!
//! With a session feed attached, each connection is bound to the session
//! that was live when it was accepted, and its closure is reported against
//! that session only.

use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};

use castbridge_common::error::{CastError, CastResult};
use castbridge_platform_core::{SessionId, TerminationSignal, TerminationSource};

use crate::frame::FrameMessage;
use crate::reader::FrameReader;

/// The media stack that receives decoded frames.
pub trait FrameConsumer: Send {
    /// Handle one frame. Frames are not retained by the server.
    fn on_frame(&mut self, frame: FrameMessage);

    fn on_producer_connected(&mut self) {}

    fn on_producer_disconnected(&mut self) {}
}

/// Counters for one server run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections: u64,
    pub frames: u64,
    pub bytes: u64,
    pub protocol_violations: u64,
    pub channel_closures: u64,
}

enum ConnectionEnd {
    Eof,
    Violation(CastError),
    Failed(CastError),
    Shutdown,
}

/// Listens on the rendezvous socket and feeds a [`FrameConsumer`].
pub struct FrameServer {
    listener: UnixListener,
    path: PathBuf,
    max_frame_bytes: u32,
    session_feed: Option<watch::Receiver<Option<SessionId>>>,
}

impl FrameServer {
    /// Bind the rendezvous path, replacing a stale socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(path: impl Into<PathBuf>, max_frame_bytes: u32) -> CastResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&path)?;
        tracing::info!(path = %path.display(), "Frame server listening");
        Ok(Self {
            listener,
            path,
            max_frame_bytes,
            session_feed: None,
        })
    }

    /// Attribute channel closures to the session published on `feed`.
    pub fn with_session_feed(mut self, feed: watch::Receiver<Option<SessionId>>) -> Self {
        self.session_feed = Some(feed);
        self
    }

    fn live_session(&self) -> Option<SessionId> {
        self.session_feed.as_ref().and_then(|feed| *feed.borrow())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve producers until `shutdown` flips (or its sender is dropped).
    pub async fn run<C: FrameConsumer>(
        &self,
        consumer: &mut C,
        signals: mpsc::UnboundedSender<TerminationSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) -> CastResult<ServerStats> {
        let mut stats = ServerStats::default();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let stream = tokio::select! {
                accepted = self.listener.accept() => accepted?.0,
                _ = shutdown.changed() => break,
            };

            stats.connections += 1;
            let mut bound = self.live_session();
            tracing::info!(
                connection = stats.connections,
                session = ?bound,
                "Producer connected"
            );
            consumer.on_producer_connected();
            let end = self
                .serve_connection(stream, consumer, &mut shutdown, &mut stats, &mut bound)
                .await;
            consumer.on_producer_disconnected();

            match end {
                ConnectionEnd::Eof => {
                    tracing::info!(frames = stats.frames, "Producer closed the channel");
                    self.report_closed(&signals, &mut stats, bound);
                }
                ConnectionEnd::Failed(e) => {
                    tracing::warn!(error = %e, "Producer connection failed");
                    self.report_closed(&signals, &mut stats, bound);
                }
                ConnectionEnd::Violation(e) => {
                    stats.protocol_violations += 1;
                    tracing::warn!(
                        error = %e,
                        "Dropping producer after protocol violation; awaiting reconnect"
                    );
                }
                ConnectionEnd::Shutdown => break,
            }
        }

        tracing::info!(?stats, "Frame server stopped");
        Ok(stats)
    }

    async fn serve_connection<C: FrameConsumer>(
        &self,
        stream: UnixStream,
        consumer: &mut C,
        shutdown: &mut watch::Receiver<bool>,
        stats: &mut ServerStats,
        bound: &mut Option<SessionId>,
    ) -> ConnectionEnd {
        let mut reader = FrameReader::new(stream, self.max_frame_bytes);
        loop {
            let next = tokio::select! {
                next = reader.next_frame() => next,
                _ = shutdown.changed() => return ConnectionEnd::Shutdown,
            };
            match next {
                Ok(Some(frame)) => {
                    // A producer that connected ahead of the session joins
                    // it with its first frame.
                    if bound.is_none() {
                        *bound = self.live_session();
                    }
                    stats.frames += 1;
                    stats.bytes += frame.total_length() as u64;
                    tracing::trace!(
                        width = frame.width,
                        height = frame.height,
                        bytes = frame.payload.len(),
                        "Frame received"
                    );
                    consumer.on_frame(frame);
                }
                Ok(None) => return ConnectionEnd::Eof,
                Err(e @ CastError::ProtocolViolation { .. }) => return ConnectionEnd::Violation(e),
                Err(e) => return ConnectionEnd::Failed(e),
            }
        }
    }

    fn report_closed(
        &self,
        signals: &mpsc::UnboundedSender<TerminationSignal>,
        stats: &mut ServerStats,
        bound: Option<SessionId>,
    ) {
        stats.channel_closures += 1;
        let signal = match (&self.session_feed, bound) {
            (None, _) => TerminationSignal::now(TerminationSource::ChannelClosed),
            (Some(_), Some(session)) => {
                TerminationSignal::for_session(TerminationSource::ChannelClosed, session)
            }
            (Some(_), None) => {
                tracing::debug!("Channel closed without a session; nothing to stop");
                return;
            }
        };
        if signals.send(signal).is_err() {
            tracing::debug!("No coordinator listening for channel closure");
        }
    }
}

impl Drop for FrameServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
