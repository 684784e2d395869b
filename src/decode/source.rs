use std::collections::VecDeque;

use crate::foundation::core::VideoStreamDescriptor;
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::frame::Frame;

/// Source contract for pulling decoded frames in presentation order.
///
/// The sequence is finite and forward-only; re-open the source to iterate again.
/// Implementations hold their decoder until [`FrameSource::close`] or drop.
pub trait FrameSource: Send {
    /// Stream metadata, fixed for the lifetime of the source.
    fn descriptor(&self) -> &VideoStreamDescriptor;
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> LumastaticResult<Option<Frame>>;
    /// Release the underlying decoder. Safe to call more than once.
    fn close(&mut self) -> LumastaticResult<()>;
}

/// In-memory source for tests and synthetic input.
///
/// The descriptor's `frame_count` is taken as given, so it may deliberately
/// disagree with the number of queued frames.
#[derive(Debug)]
pub struct InMemorySource {
    descriptor: VideoStreamDescriptor,
    frames: VecDeque<Frame>,
    closed: bool,
}

impl InMemorySource {
    /// Create a source that yields `frames` in order.
    pub fn new(
        descriptor: VideoStreamDescriptor,
        frames: impl IntoIterator<Item = Frame>,
    ) -> LumastaticResult<Self> {
        let frames: VecDeque<Frame> = frames.into_iter().collect();
        let dims = descriptor.dimensions();
        if let Some((i, f)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.dimensions() != dims)
        {
            return Err(LumastaticError::validation(format!(
                "frame {i} is {}x{}, descriptor says {}x{}",
                f.width, f.height, dims.width, dims.height
            )));
        }
        Ok(Self {
            descriptor,
            frames,
            closed: false,
        })
    }

    /// Frames not yet pulled.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Whether [`FrameSource::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSource for InMemorySource {
    fn descriptor(&self) -> &VideoStreamDescriptor {
        &self.descriptor
    }

    fn next_frame(&mut self) -> LumastaticResult<Option<Frame>> {
        if self.closed {
            return Err(LumastaticError::open("in-memory source is closed"));
        }
        Ok(self.frames.pop_front())
    }

    fn close(&mut self) -> LumastaticResult<()> {
        self.closed = true;
        self.frames.clear();
        Ok(())
    }
}
