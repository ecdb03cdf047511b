//! The capture-side sample handler.

use castbridge_frame_transport::{Connector, FrameHeader, FrameWriter, SendError};
use castbridge_platform_core::{BroadcastHandler, CaptureSample, PixelView, SampleKind};

use crate::stats::SurfaceStats;

/// Broadcast lifecycle as seen by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// No broadcast has started yet.
    Inactive,
    /// Samples are being framed and sent.
    Active,
    /// The user paused the broadcast.
    Paused,
    /// The broadcast is over; the channel is closed.
    Finished,
}

/// What happened to one video sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Sent,
    /// No consumer connection could be made.
    NoChannel,
    /// The sample had no readable pixels.
    NoPixels,
    /// The channel refused the frame.
    WriteFailed,
}

/// Frames video samples onto the transport channel.
///
/// The connection is opened lazily: on broadcast start and, while still
/// unconnected, once per subsequent video sample.
pub struct SampleHandler<C: Connector> {
    connector: C,
    writer: Option<FrameWriter<C::Stream>>,
    state: SurfaceState,
    stats: SurfaceStats,
}

impl<C: Connector> SampleHandler<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            writer: None,
            state: SurfaceState::Inactive,
            stats: SurfaceStats::default(),
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn stats(&self) -> &SurfaceStats {
        &self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn activate(&mut self) {
        self.state = SurfaceState::Active;
        tracing::info!(target_path = %self.connector.describe(), "Capture surface active");
        self.ensure_connected();
    }

    fn ensure_connected(&mut self) -> bool {
        if self.writer.is_some() {
            return true;
        }
        match self.connector.connect() {
            Ok(stream) => {
                tracing::info!(target_path = %self.connector.describe(), "Connected to frame channel");
                self.writer = Some(FrameWriter::new(stream));
                true
            }
            Err(e) => {
                self.stats.connect_failures += 1;
                tracing::warn!(
                    target_path = %self.connector.describe(),
                    error = %e,
                    "Frame delivery unavailable"
                );
                false
            }
        }
    }

    /// Frame and send one video sample.
    pub fn deliver(&mut self, sample: &dyn CaptureSample) -> FrameOutcome {
        if !self.ensure_connected() {
            self.stats.frames_dropped += 1;
            return FrameOutcome::NoChannel;
        }

        let orientation = sample.orientation().unwrap_or(0);
        let mut outcome = FrameOutcome::NoPixels;
        sample.with_pixels(&mut |view| {
            outcome = self.send_view(view, orientation);
        });

        match outcome {
            FrameOutcome::Sent => {}
            _ => self.stats.frames_dropped += 1,
        }
        outcome
    }

    fn send_view(&mut self, view: PixelView<'_>, orientation: u32) -> FrameOutcome {
        let frame_len = view.frame_len();
        if frame_len == 0 || view.data.len() < frame_len {
            tracing::debug!(
                width = view.width,
                height = view.height,
                bytes_per_row = view.bytes_per_row,
                available = view.data.len(),
                "Sample buffer too small for its geometry"
            );
            return FrameOutcome::NoPixels;
        }

        let header = match FrameHeader::for_payload(view.width, view.height, orientation, frame_len)
        {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(error = %e, "Cannot frame sample");
                return FrameOutcome::NoPixels;
            }
        };

        let Some(writer) = self.writer.as_mut() else {
            return FrameOutcome::NoChannel;
        };
        match writer.send(&header, &view.data[..frame_len]) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += header.total_length as u64;
                tracing::trace!(width = view.width, height = view.height, "Frame sent");
                FrameOutcome::Sent
            }
            Err(e) => {
                self.on_send_failure(&e);
                FrameOutcome::WriteFailed
            }
        }
    }

    fn on_send_failure(&mut self, e: &SendError) {
        if e.desynced() || e.is_broken_pipe() {
            // The consumer will see a truncated frame or EOF; start over on
            // the next sample.
            tracing::warn!(error = %e, "Frame channel lost; dropping connection");
            self.writer = None;
            self.stats.disconnects += 1;
        } else {
            tracing::debug!(error = %e, "Consumer not accepting; frame dropped");
        }
    }
}

impl<C: Connector> BroadcastHandler for SampleHandler<C> {
    fn broadcast_started(&mut self) {
        self.activate();
    }

    fn broadcast_paused(&mut self) {
        if self.state == SurfaceState::Active {
            self.state = SurfaceState::Paused;
            tracing::info!("Broadcast paused");
        }
    }

    fn broadcast_resumed(&mut self) {
        if self.state == SurfaceState::Paused {
            self.state = SurfaceState::Active;
            tracing::info!("Broadcast resumed");
        }
    }

    fn broadcast_finished(&mut self) {
        self.state = SurfaceState::Finished;
        self.writer = None;
        tracing::info!(
            frames_sent = self.stats.frames_sent,
            frames_dropped = self.stats.frames_dropped,
            drop_rate = self.stats.drop_rate(),
            "Broadcast finished; frame channel closed"
        );
    }

    fn process_sample(&mut self, sample: &dyn CaptureSample) {
        match self.state {
            SurfaceState::Inactive => self.activate(),
            SurfaceState::Active => {}
            SurfaceState::Paused | SurfaceState::Finished => {
                self.stats.samples_ignored += 1;
                return;
            }
        }

        match sample.kind() {
            SampleKind::Video => {
                self.deliver(sample);
            }
            SampleKind::AudioApp | SampleKind::AudioMic => {
                self.stats.samples_ignored += 1;
            }
        }
    }
}
