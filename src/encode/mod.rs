//! Encoding sinks and the audio remux step.
//!
//! Sinks consume composited frames in stream order; the remuxer joins the finished
//! visual-only file with the source's audio.

/// `ffmpeg`-based sink (visual-only intermediate via system `ffmpeg`).
pub mod ffmpeg;
/// Audio remux via system `ffmpeg`.
pub mod remux;
/// Generic frame sink trait and built-in sinks.
pub mod sink;
