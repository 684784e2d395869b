use crate::foundation::core::Dimensions;
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::luma::LumaMode;
use crate::raster::plane::GrayPlane;

/// Bytes per pixel of a packed RGB24 frame.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// One decoded video frame as packed RGB24, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap an RGB24 buffer, checking its length against the dimensions.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> LumastaticResult<Self> {
        let expected = width as usize * height as usize * RGB_BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(LumastaticError::validation(format!(
                "rgb frame buffer has {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let px = width as usize * height as usize;
        Self {
            width,
            height,
            data: rgb.repeat(px),
        }
    }

    /// Frame dimensions.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Byte length of one RGB24 frame of the given size.
    pub fn byte_len(dims: Dimensions) -> usize {
        dims.pixel_count() * RGB_BYTES_PER_PIXEL
    }

    /// Convert to a single-channel luminance plane.
    pub fn to_luma(&self, mode: LumaMode) -> GrayPlane {
        let data = self
            .data
            .chunks_exact(RGB_BYTES_PER_PIXEL)
            .map(|px| mode.luma(px[0], px[1], px[2]))
            .collect();
        GrayPlane {
            width: self.width,
            height: self.height,
            data,
        }
    }
}
