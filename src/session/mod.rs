//! Pipeline driver: configuration, run state machine and progress reporting.

/// Run configuration (JSON-loadable).
pub mod config;
/// Frame-by-frame driver.
pub mod pipeline;
/// Progress observation.
pub mod progress;
