use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of run progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Frames pulled from the source.
    pub frames_read: u64,
    /// Frames composited.
    pub frames_composited: u64,
    /// Frames accepted by the sink.
    pub frames_written: u64,
    /// The source's advertised frame count. May be wrong or 0.
    pub frames_estimated: u64,
}

/// Receives progress while frames stream. Purely observational.
///
/// Callbacks run on the compositing thread.
pub trait ProgressObserver {
    /// Streaming is about to begin.
    fn on_start(&mut self, _estimated_frames: u64) {}
    /// One more frame was composited.
    fn on_frame(&mut self, _update: ProgressUpdate) {}
    /// Streaming ended (successfully or not).
    fn on_finish(&mut self, _update: ProgressUpdate) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Per-run counters, shared between pipeline stages.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub(crate) read: AtomicU64,
    pub(crate) composited: AtomicU64,
    pub(crate) written: AtomicU64,
}

impl RunCounters {
    pub(crate) fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn snapshot(&self, estimated: u64) -> ProgressUpdate {
        ProgressUpdate {
            frames_read: self.read.load(Ordering::Relaxed),
            frames_composited: self.composited.load(Ordering::Relaxed),
            frames_written: self.written.load(Ordering::Relaxed),
            frames_estimated: estimated,
        }
    }
}
