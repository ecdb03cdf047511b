//! Frame message codec.

use castbridge_common::error::{CastError, CastResult};
use castbridge_platform_core::Orientation;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 16;

/// The 16-byte header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Header plus payload, in bytes.
    pub total_length: u32,
    pub width: u32,
    pub height: u32,
    /// Raw orientation value, see [`Orientation`].
    pub orientation: u32,
}

impl FrameHeader {
    /// Build the header for a payload of `payload_len` bytes.
    pub fn for_payload(
        width: u32,
        height: u32,
        orientation: u32,
        payload_len: usize,
    ) -> CastResult<Self> {
        if payload_len == 0 {
            return Err(CastError::channel("refusing to frame an empty payload"));
        }
        let total_length = payload_len
            .checked_add(HEADER_LEN)
            .and_then(|total| u32::try_from(total).ok())
            .ok_or_else(|| {
                CastError::channel(format!("payload of {payload_len} bytes does not fit a frame"))
            })?;
        Ok(Self {
            total_length,
            width,
            height,
            orientation,
        })
    }

    /// Payload bytes following this header.
    pub fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(HEADER_LEN)
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_raw(self.orientation)
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.total_length.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.width.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.height.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.orientation.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let field = |at: usize| {
            u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Self {
            total_length: field(0),
            width: field(4),
            height: field(8),
            orientation: field(12),
        }
    }

    /// Check the declared length before trusting it for a read.
    pub fn validate(&self, max_frame_bytes: u32) -> CastResult<()> {
        if (self.total_length as usize) <= HEADER_LEN {
            return Err(CastError::protocol(HEADER_LEN + 1, self.total_length as usize));
        }
        if self.total_length > max_frame_bytes {
            return Err(CastError::protocol(
                max_frame_bytes as usize,
                self.total_length as usize,
            ));
        }
        Ok(())
    }
}

/// One decoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMessage {
    pub width: u32,
    pub height: u32,
    pub orientation: u32,
    pub payload: Vec<u8>,
}

impl FrameMessage {
    pub fn header(&self) -> CastResult<FrameHeader> {
        FrameHeader::for_payload(self.width, self.height, self.orientation, self.payload.len())
    }

    pub fn total_length(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialize header and payload into one buffer.
    pub fn encode(&self) -> CastResult<Vec<u8>> {
        let header = self.header()?;
        let mut out = Vec::with_capacity(self.total_length());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decode exactly one frame from `bytes`.
    pub fn decode(bytes: &[u8]) -> CastResult<Self> {
        let header_bytes: &[u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| CastError::protocol(HEADER_LEN, bytes.len()))?;
        let header = FrameHeader::decode(header_bytes);
        header.validate(u32::MAX)?;
        let total = header.total_length as usize;
        if bytes.len() != total {
            return Err(CastError::protocol(total, bytes.len()));
        }
        Ok(Self {
            width: header.width,
            height: header.height,
            orientation: header.orientation,
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}
