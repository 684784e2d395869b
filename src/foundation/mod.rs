/// Shared value types (frame indices, rates, stream descriptors).
pub mod core;
/// Crate error type.
pub mod error;
