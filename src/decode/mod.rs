//! Frame sources: ordered, forward-only decoded frames plus stream metadata.

/// `ffmpeg`-backed streaming decoder.
pub mod ffmpeg;
/// `ffprobe` metadata probing.
pub mod probe;
/// Generic frame source trait and built-in sources.
pub mod source;
