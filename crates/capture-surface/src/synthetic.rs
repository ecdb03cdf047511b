//! Synthetic samples for simulations and tests.

use castbridge_platform_core::{CaptureSample, PixelView, SampleKind};

const BYTES_PER_PIXEL: u32 = 4;

/// An owned sample with a BGRA test pattern.
#[derive(Debug, Clone)]
pub struct SyntheticSample {
    kind: SampleKind,
    width: u32,
    height: u32,
    bytes_per_row: u32,
    orientation: Option<u32>,
    pixels: Option<Vec<u8>>,
}

impl SyntheticSample {
    /// A diagonal gradient that shifts with `seq`, so consecutive frames differ.
    pub fn gradient(width: u32, height: u32, seq: u32) -> Self {
        Self::gradient_padded(width, height, seq, 0)
    }

    /// Like [`gradient`](Self::gradient) with `padding` extra bytes per row.
    pub fn gradient_padded(width: u32, height: u32, seq: u32, padding: u32) -> Self {
        let bytes_per_row = width * BYTES_PER_PIXEL + padding;
        let mut pixels = vec![0u8; (bytes_per_row * height) as usize];
        for y in 0..height {
            let start = (y * bytes_per_row) as usize;
            let row = &mut pixels[start..start + (width * BYTES_PER_PIXEL) as usize];
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL as usize).enumerate() {
                let v = (x as u32 + y + seq) as u8;
                px.copy_from_slice(&[v, v.wrapping_mul(2), v.wrapping_mul(3), 0xFF]);
            }
        }
        Self {
            kind: SampleKind::Video,
            width,
            height,
            bytes_per_row,
            orientation: None,
            pixels: Some(pixels),
        }
    }

    /// A video sample with no image buffer attached.
    pub fn empty_video() -> Self {
        Self {
            kind: SampleKind::Video,
            width: 0,
            height: 0,
            bytes_per_row: 0,
            orientation: None,
            pixels: None,
        }
    }

    pub fn audio(kind: SampleKind) -> Self {
        Self {
            kind,
            ..Self::empty_video()
        }
    }

    pub fn with_orientation(mut self, orientation: u32) -> Self {
        self.orientation = Some(orientation);
        self
    }
}

impl CaptureSample for SyntheticSample {
    fn kind(&self) -> SampleKind {
        self.kind
    }

    fn orientation(&self) -> Option<u32> {
        self.orientation
    }

    fn with_pixels(&self, f: &mut dyn FnMut(PixelView<'_>)) -> bool {
        match &self.pixels {
            Some(pixels) => {
                f(PixelView {
                    width: self.width,
                    height: self.height,
                    bytes_per_row: self.bytes_per_row,
                    data: pixels,
                });
                true
            }
            None => false,
        }
    }
}
