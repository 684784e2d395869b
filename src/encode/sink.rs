use crate::foundation::core::{Fps, FrameIndex, VideoStreamDescriptor};
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::plane::OutputFrame;

/// Configuration provided to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frames-per-second.
    pub fps: Fps,
}

impl SinkConfig {
    /// Mirror the source stream's geometry and rate.
    pub fn from_descriptor(d: &VideoStreamDescriptor) -> Self {
        Self {
            width: d.width,
            height: d.height,
            fps: d.frame_rate,
        }
    }
}

/// Sink contract for consuming composited frames in stream order.
///
/// Ordering contract: `push_frame` is called with strictly increasing `FrameIndex`.
/// `end` is called exactly once per `begin`, including after a failed run.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> LumastaticResult<()>;
    /// Append one frame.
    fn push_frame(&mut self, idx: FrameIndex, frame: &OutputFrame) -> LumastaticResult<()>;
    /// Finalize the output.
    fn end(&mut self) -> LumastaticResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, OutputFrame)>,
    begun: u32,
    ended: u32,
    fail_at: Option<u64>,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects the frame with index `idx`, for exercising abort paths.
    pub fn failing_at(idx: u64) -> Self {
        Self {
            fail_at: Some(idx),
            ..Self::default()
        }
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// Captured frames in arrival order.
    pub fn frames(&self) -> &[(FrameIndex, OutputFrame)] {
        &self.frames
    }

    /// How many times `begin` and `end` were called.
    pub fn lifecycle_calls(&self) -> (u32, u32) {
        (self.begun, self.ended)
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> LumastaticResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(LumastaticError::write(
                "sink width/height must be non-zero",
            ));
        }
        self.cfg = Some(cfg);
        self.frames.clear();
        self.begun += 1;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &OutputFrame) -> LumastaticResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| LumastaticError::write("in-memory sink not started"))?;
        if self.fail_at == Some(idx.0) {
            return Err(LumastaticError::write(format!(
                "in-memory sink rejected frame {}",
                idx.0
            )));
        }
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(LumastaticError::write(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> LumastaticResult<()> {
        self.ended += 1;
        Ok(())
    }
}
