use crate::foundation::error::{LumastaticError, LumastaticResult};

/// Absolute 0-based frame index in stream order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> LumastaticResult<Self> {
        if den == 0 {
            return Err(LumastaticError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(LumastaticError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Parse an ffmpeg-style rate string (`"30000/1001"` or `"25"`).
    pub fn parse_ratio(s: &str) -> Option<Self> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((a, b)) => (a.trim().parse::<u32>().ok()?, b.trim().parse::<u32>().ok()?),
            None => (s.parse::<u32>().ok()?, 1),
        };
        Self::new(num, den).ok()
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Estimate how many frames cover `secs` seconds (rounded to nearest).
    pub fn frames_in_secs(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }

    /// Render as the `num/den` argument accepted by `ffmpeg -r`.
    pub fn to_ffmpeg_arg(self) -> String {
        format!("{}/{}", self.num, self.den)
    }
}

/// Pixel grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Number of pixels in the grid.
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Return `true` when either side is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Return `true` when both sides are even (yuv420p chroma subsampling).
    pub fn is_even(self) -> bool {
        self.width.is_multiple_of(2) && self.height.is_multiple_of(2)
    }
}

/// Metadata of the visual stream read from a source container.
///
/// Immutable once read; the sink is configured with the same width, height and rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VideoStreamDescriptor {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate.
    pub frame_rate: Fps,
    /// Advertised frame count. Only an estimate; may be 0 when unknown.
    pub frame_count: u64,
}

impl VideoStreamDescriptor {
    /// Create a validated descriptor.
    pub fn new(width: u32, height: u32, frame_rate: Fps, frame_count: u64) -> LumastaticResult<Self> {
        if width == 0 || height == 0 {
            return Err(LumastaticError::validation(format!(
                "stream dimensions must be non-zero (got {width}x{height})"
            )));
        }
        Ok(Self {
            width,
            height,
            frame_rate,
            frame_count,
        })
    }

    /// Dimensions of every frame in the stream.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}
