//! Lumastatic applies a luma-matte static effect to video.
//!
//! Every pixel brighter than a threshold shows noise that changes every frame; every other
//! pixel shows one frozen noise field drawn once per run. The original audio is carried over.
//!
//! - Open a [`FrameSource`] (usually [`FfmpegSource`])
//! - Create an [`EffectSession`] from an [`EffectConfig`]
//! - Stream frames into a [`FrameSink`], or call [`EffectSession::render_file`] to also remux audio
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Source acquisition (local paths, URL downloads).
pub mod acquire;
/// Frame sources and probing.
pub mod decode;
/// Luma matte compositing.
pub mod effects;
/// Frame sinks and audio remux.
pub mod encode;
mod foundation;
/// Noise field generation.
pub mod noise;
/// Frame and plane containers.
pub mod raster;
/// Pipeline driver.
pub mod session;

#[cfg(all(test, unix))]
#[path = "../tests/unit/support.rs"]
mod test_support;

pub use crate::acquire::{LocalFile, SourceAcquirer, YtDlp};
pub use crate::decode::ffmpeg::FfmpegSource;
pub use crate::decode::probe::{ProbeInfo, probe_video};
pub use crate::decode::source::{FrameSource, InMemorySource};
pub use crate::effects::matte::{DEFAULT_LUMA_THRESHOLD, LumaMatte, MatteCompositor, apply_matte};
pub use crate::encode::ffmpeg::{ContainerFormat, FfmpegSink, FfmpegSinkOpts};
pub use crate::encode::remux::{MissingAudioPolicy, RemuxOpts, Remuxer};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::foundation::core::{Dimensions, Fps, FrameIndex, VideoStreamDescriptor};
pub use crate::foundation::error::{LumastaticError, LumastaticResult};
pub use crate::noise::generator::{NoiseDepth, NoiseGenerator};
pub use crate::raster::frame::Frame;
pub use crate::raster::luma::LumaMode;
pub use crate::raster::plane::{GrayPlane, NoiseField, OutputFrame};
pub use crate::session::config::EffectConfig;
pub use crate::session::pipeline::{EffectSession, PipelineState, RunReport, RunStats};
pub use crate::session::progress::{NoProgress, ProgressObserver, ProgressUpdate};
