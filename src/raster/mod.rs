//! Pixel containers shared by the decode, effect and encode stages.

/// Decoded RGB frames.
pub mod frame;
/// Luminance conversion.
pub mod luma;
/// Single-channel 8-bit planes (noise fields, output frames).
pub mod plane;
