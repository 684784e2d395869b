/// How an RGB sample is reduced to one brightness value.
///
/// The mode is fixed for a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LumaMode {
    /// ITU-R BT.601 weights (0.299, 0.587, 0.114), integer fixed point.
    #[default]
    Rec601,
    /// Plain mean of the three channels.
    Average,
}

impl LumaMode {
    /// Luminance of one RGB sample on a 0..=255 scale.
    #[inline]
    pub fn luma(self, r: u8, g: u8, b: u8) -> u8 {
        let (r, g, b) = (u32::from(r), u32::from(g), u32::from(b));
        match self {
            // Weights scaled by 2^14; they sum to exactly 16384 so white maps to 255.
            Self::Rec601 => ((4899 * r + 9617 * g + 1868 * b + (1 << 13)) >> 14) as u8,
            Self::Average => ((r + g + b + 1) / 3) as u8,
        }
    }
}
