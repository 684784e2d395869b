use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::foundation::core::Dimensions;
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::plane::NoiseField;

/// Sample alphabet of generated noise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseDepth {
    /// Uniform over the full 8-bit range `0..=255`.
    #[default]
    Bits8,
    /// Uniform over `{0, 255}` (pure black/white speckle).
    Bits1,
}

/// Source of independent, uniformly distributed noise fields.
///
/// One generator serves a whole run: the static field is drawn once, then one
/// dynamic field per frame, in frame order. A seeded generator repeats that
/// sequence exactly.
pub struct NoiseGenerator {
    rng: StdRng,
    depth: NoiseDepth,
}

impl NoiseGenerator {
    /// Generator seeded from OS entropy (non-reproducible).
    pub fn from_entropy(depth: NoiseDepth) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            depth,
        }
    }

    /// Generator with a fixed seed.
    pub fn seeded(seed: u64, depth: NoiseDepth) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            depth,
        }
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn new(seed: Option<u64>, depth: NoiseDepth) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed, depth),
            None => Self::from_entropy(depth),
        }
    }

    /// Sample alphabet in use.
    pub fn depth(&self) -> NoiseDepth {
        self.depth
    }

    /// Draw a fresh `width x height` field.
    pub fn generate(&mut self, width: u32, height: u32) -> LumastaticResult<NoiseField> {
        let dims = Dimensions { width, height };
        if dims.is_empty() {
            return Err(LumastaticError::validation(format!(
                "noise field dimensions must be non-zero (got {width}x{height})"
            )));
        }
        let mut field = NoiseField::zeroed(width, height);
        self.refill(&mut field);
        Ok(field)
    }

    /// Overwrite every sample of `field` with new draws.
    pub fn refill(&mut self, field: &mut NoiseField) {
        self.rng.fill_bytes(&mut field.data);
        if self.depth == NoiseDepth::Bits1 {
            for v in &mut field.data {
                *v = if *v & 0x80 != 0 { 255 } else { 0 };
            }
        }
    }
}

impl std::fmt::Debug for NoiseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseGenerator")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/noise/generator.rs"]
mod tests;
