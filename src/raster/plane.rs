use crate::foundation::core::Dimensions;
use crate::foundation::error::{LumastaticError, LumastaticResult};

/// Dense single-channel 8-bit grid, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayPlane {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height` samples.
    pub data: Vec<u8>,
}

/// A pseudo-random noise layer.
pub type NoiseField = GrayPlane;

/// One composited output frame, handed straight to the sink.
pub type OutputFrame = GrayPlane;

impl GrayPlane {
    /// A zero-filled plane.
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize],
        }
    }

    /// A plane filled with `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Wrap a sample buffer, checking its length against the dimensions.
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> LumastaticResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(LumastaticError::validation(format!(
                "gray plane buffer has {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Plane dimensions.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Sample at `(x, y)`.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub(crate) fn ensure_dimensions(&self, what: &str, dims: Dimensions) -> LumastaticResult<()> {
        if self.dimensions() != dims || self.data.len() != dims.pixel_count() {
            return Err(LumastaticError::validation(format!(
                "{what} is {}x{} ({} samples), expected {}x{}",
                self.width,
                self.height,
                self.data.len(),
                dims.width,
                dims.height
            )));
        }
        Ok(())
    }
}
