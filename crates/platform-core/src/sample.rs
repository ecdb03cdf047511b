//! Capture-sample delivery callbacks.
//!
//! These mirror the dispatch points a host uses to hand captured media to
//! an out-of-process capture extension. The host is the caller; the
//! capture surface implements [`BroadcastHandler`].

/// Classification of a delivered sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Video,
    AudioApp,
    AudioMic,
}

/// Rotation tag attached to a video sample.
///
/// Values follow the EXIF / CGImagePropertyOrientation numbering. `0` is
/// sent when the host attached no orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Unspecified,
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
    Unknown(u32),
}

impl Orientation {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Unspecified,
            1 => Self::Up,
            2 => Self::UpMirrored,
            3 => Self::Down,
            4 => Self::DownMirrored,
            5 => Self::LeftMirrored,
            6 => Self::Right,
            7 => Self::RightMirrored,
            8 => Self::Left,
            other => Self::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Up => 1,
            Self::UpMirrored => 2,
            Self::Down => 3,
            Self::DownMirrored => 4,
            Self::LeftMirrored => 5,
            Self::Right => 6,
            Self::RightMirrored => 7,
            Self::Left => 8,
            Self::Unknown(raw) => raw,
        }
    }

    /// Clockwise rotation in degrees a viewer applies to display upright.
    pub fn rotation_degrees(self) -> u32 {
        match self {
            Self::Down | Self::DownMirrored => 180,
            Self::Right | Self::RightMirrored => 90,
            Self::Left | Self::LeftMirrored => 270,
            _ => 0,
        }
    }
}

/// Read-only view of a locked pixel buffer.
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    /// Base address of the buffer; at least `height * bytes_per_row` bytes.
    pub data: &'a [u8],
}

impl PixelView<'_> {
    /// Number of bytes that make up the visible rows.
    pub fn frame_len(&self) -> usize {
        self.height as usize * self.bytes_per_row as usize
    }
}

/// One sample delivered by the host.
pub trait CaptureSample {
    fn kind(&self) -> SampleKind;

    /// Raw orientation attachment, if any.
    fn orientation(&self) -> Option<u32>;

    /// Lock the pixel buffer for reading and run `f` while it is locked.
    ///
    /// Returns `false` when the sample carries no image buffer. The buffer
    /// is unlocked before this returns.
    fn with_pixels(&self, f: &mut dyn FnMut(PixelView<'_>)) -> bool;
}

/// Host-dictated lifecycle and delivery callbacks of a capture extension.
pub trait BroadcastHandler: Send {
    /// Capture has begun (at any privilege kind).
    fn broadcast_started(&mut self);

    /// The user paused capture; no samples until resumed.
    fn broadcast_paused(&mut self) {}

    fn broadcast_resumed(&mut self) {}

    /// Capture is over for good.
    fn broadcast_finished(&mut self);

    /// Deliver one sample. Must return within the real-time deadline.
    fn process_sample(&mut self, sample: &dyn CaptureSample);
}
