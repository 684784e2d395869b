/// Luma matte derivation and noise-layer selection.
pub mod matte;
