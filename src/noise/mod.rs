/// Uniform noise fields.
pub mod generator;
