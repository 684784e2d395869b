use rayon::prelude::*;

use crate::foundation::core::Dimensions;
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::frame::{Frame, RGB_BYTES_PER_PIXEL};
use crate::raster::luma::LumaMode;
use crate::raster::plane::{GrayPlane, NoiseField, OutputFrame};

/// Default luminance threshold on a 0..=255 scale.
pub const DEFAULT_LUMA_THRESHOLD: u8 = 127;

/// Per-pixel binary mask derived from one frame.
///
/// `true` marks foreground (luminance strictly above the threshold).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LumaMatte {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major mask, `width * height` entries.
    pub mask: Vec<bool>,
}

impl LumaMatte {
    /// Number of foreground pixels.
    pub fn foreground_count(&self) -> usize {
        self.mask.iter().filter(|m| **m).count()
    }

    /// Mask value at `(x, y)`.
    pub fn is_foreground(&self, x: u32, y: u32) -> Option<bool> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.mask
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Selects between the static and dynamic noise fields per pixel, keyed on source luminance.
///
/// Foreground pixels take the dynamic field, background pixels the static one. This is
/// an exact selection; no sample is ever blended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatteCompositor {
    /// Luminance threshold; a pixel is foreground when `luma > threshold`.
    pub threshold: u8,
    /// RGB to luminance conversion.
    pub luma: LumaMode,
    /// Split rows across the current rayon pool.
    pub parallel: bool,
}

impl Default for MatteCompositor {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LUMA_THRESHOLD,
            luma: LumaMode::default(),
            parallel: false,
        }
    }
}

impl MatteCompositor {
    /// Sequential compositor with the given threshold and luma conversion.
    pub fn new(threshold: u8, luma: LumaMode) -> Self {
        Self {
            threshold,
            luma,
            parallel: false,
        }
    }

    /// Enable or disable row-parallel compositing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Threshold a luminance plane.
    pub fn matte_from_luma(&self, luma: &GrayPlane) -> LumaMatte {
        LumaMatte {
            width: luma.width,
            height: luma.height,
            mask: luma.data.iter().map(|&l| l > self.threshold).collect(),
        }
    }

    /// Luminance conversion followed by thresholding.
    pub fn derive_matte(&self, frame: &Frame) -> LumaMatte {
        self.matte_from_luma(&frame.to_luma(self.luma))
    }

    /// Composite one frame into a newly allocated output frame.
    pub fn composite(
        &self,
        frame: &Frame,
        static_field: &NoiseField,
        dynamic_field: &NoiseField,
    ) -> LumastaticResult<OutputFrame> {
        let mut out = OutputFrame::zeroed(frame.width, frame.height);
        self.composite_into(frame, static_field, dynamic_field, &mut out)?;
        Ok(out)
    }

    /// Composite one frame into `out`, which must already have the frame's dimensions.
    ///
    /// Luminance, matte and selection are fused per pixel; the result equals
    /// [`apply_matte`] over [`MatteCompositor::derive_matte`].
    pub fn composite_into(
        &self,
        frame: &Frame,
        static_field: &NoiseField,
        dynamic_field: &NoiseField,
        out: &mut OutputFrame,
    ) -> LumastaticResult<()> {
        let dims = frame.dimensions();
        check_frame(frame, dims)?;
        static_field.ensure_dimensions("static noise field", dims)?;
        dynamic_field.ensure_dimensions("dynamic noise field", dims)?;
        out.ensure_dimensions("output frame", dims)?;
        if dims.is_empty() {
            return Ok(());
        }

        let w = dims.width as usize;
        let row = |(((dst, src), s), d): (((&mut [u8], &[u8]), &[u8]), &[u8])| {
            self.composite_row(dst, src, s, d)
        };
        if self.parallel {
            out.data
                .par_chunks_mut(w)
                .zip(frame.data.par_chunks(w * RGB_BYTES_PER_PIXEL))
                .zip(static_field.data.par_chunks(w))
                .zip(dynamic_field.data.par_chunks(w))
                .for_each(row);
        } else {
            out.data
                .chunks_mut(w)
                .zip(frame.data.chunks(w * RGB_BYTES_PER_PIXEL))
                .zip(static_field.data.chunks(w))
                .zip(dynamic_field.data.chunks(w))
                .for_each(row);
        }
        Ok(())
    }

    #[inline]
    fn composite_row(&self, dst: &mut [u8], src: &[u8], s: &[u8], d: &[u8]) {
        for (((o, px), &sv), &dv) in dst
            .iter_mut()
            .zip(src.chunks_exact(RGB_BYTES_PER_PIXEL))
            .zip(s)
            .zip(d)
        {
            let l = self.luma.luma(px[0], px[1], px[2]);
            *o = if l > self.threshold { dv } else { sv };
        }
    }
}

/// Select per pixel: `dynamic` where the matte is foreground, `static` elsewhere.
pub fn apply_matte(
    matte: &LumaMatte,
    static_field: &NoiseField,
    dynamic_field: &NoiseField,
) -> LumastaticResult<OutputFrame> {
    let dims = Dimensions {
        width: matte.width,
        height: matte.height,
    };
    if matte.mask.len() != dims.pixel_count() {
        return Err(LumastaticError::validation(
            "luma matte mask length does not match its dimensions",
        ));
    }
    static_field.ensure_dimensions("static noise field", dims)?;
    dynamic_field.ensure_dimensions("dynamic noise field", dims)?;

    let data = matte
        .mask
        .iter()
        .zip(static_field.data.iter().zip(&dynamic_field.data))
        .map(|(&fg, (&s, &d))| if fg { d } else { s })
        .collect();
    Ok(OutputFrame {
        width: matte.width,
        height: matte.height,
        data,
    })
}

fn check_frame(frame: &Frame, dims: Dimensions) -> LumastaticResult<()> {
    let expected = Frame::byte_len(dims);
    if frame.data.len() != expected {
        return Err(LumastaticError::validation(format!(
            "frame.data has {} bytes, expected {expected} for {}x{} rgb24",
            frame.data.len(),
            dims.width,
            dims.height
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/effects/matte.rs"]
mod tests;
