use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::decode::ffmpeg::FfmpegSource;
use crate::decode::source::FrameSource;
use crate::effects::matte::MatteCompositor;
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::remux::{MissingAudioPolicy, Remuxer, check_output_path};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{FrameIndex, VideoStreamDescriptor};
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::noise::generator::NoiseGenerator;
use crate::raster::frame::Frame;
use crate::raster::plane::{NoiseField, OutputFrame};
use crate::session::config::EffectConfig;
use crate::session::progress::{ProgressObserver, RunCounters};

/// Where a run currently is.
///
/// `Idle -> Opened -> Streaming -> Finalizing -> Done`, with any state able to move to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing opened yet.
    Idle,
    /// Source and sink open, static field generated.
    Opened,
    /// Frames flowing.
    Streaming,
    /// Sink closed; remux (if any) in progress.
    Finalizing,
    /// Output complete.
    Done,
    /// The run aborted.
    Failed,
}

/// Frame accounting for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    /// Frames pulled from the source.
    pub frames_read: u64,
    /// Frames accepted by the sink.
    pub frames_written: u64,
    /// Frame count the source advertised up front.
    pub frames_estimated: u64,
}

/// Result of a file-to-file run.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RunReport {
    /// Final output file.
    pub output: PathBuf,
    /// Whether the source carried an audio stream.
    pub has_audio: bool,
    /// Frame accounting.
    pub stats: RunStats,
}

/// Drives frames from a [`FrameSource`] through the matte compositor into a [`FrameSink`].
///
/// The static noise field is drawn once per run; every frame gets a fresh dynamic field.
/// Noise is always drawn in frame order, so a seeded session is reproducible whether or
/// not stages overlap.
#[derive(Debug)]
pub struct EffectSession {
    cfg: EffectConfig,
    compositor: MatteCompositor,
    noise: NoiseGenerator,
    pool: Option<rayon::ThreadPool>,
    state: PipelineState,
}

impl EffectSession {
    /// Build a session from a validated config.
    pub fn new(cfg: EffectConfig) -> LumastaticResult<Self> {
        let noise = cfg.noise_generator();
        Self::with_noise(cfg, noise)
    }

    /// Build a session with an explicit noise generator.
    pub fn with_noise(cfg: EffectConfig, noise: NoiseGenerator) -> LumastaticResult<Self> {
        cfg.validate()?;
        let pool = if cfg.parallel_pixels && cfg.threads.is_some() {
            Some(build_thread_pool(cfg.threads)?)
        } else {
            None
        };
        Ok(Self {
            compositor: cfg.compositor(),
            cfg,
            noise,
            pool,
            state: PipelineState::Idle,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &EffectConfig {
        &self.cfg
    }

    /// Current state of the most recent run.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stream every frame of `source` into `sink`.
    ///
    /// The sink is ended exactly once if `begin` succeeded and the source is closed on
    /// every path. A source that yields no frames is an `EmptyStream` error.
    #[tracing::instrument(skip_all, fields(overlap = self.cfg.overlap_stages))]
    pub fn process(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &mut dyn ProgressObserver,
    ) -> LumastaticResult<RunStats> {
        let stats = self.run_to_sink(source, sink, progress)?;
        self.transition(PipelineState::Done);
        Ok(stats)
    }

    /// Decode `input`, apply the effect, and write `output` with the source's audio.
    ///
    /// Video goes to an intermediate file in the temp dir first. The intermediate is
    /// removed on every path; `output` is only replaced once the remux has succeeded.
    #[tracing::instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
    pub fn render_file(
        &mut self,
        input: &Path,
        output: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> LumastaticResult<RunReport> {
        self.transition(PipelineState::Idle);
        let res = self.render_file_inner(input, output, progress);
        if res.is_err() {
            self.transition(PipelineState::Failed);
        }
        res
    }

    fn render_file_inner(
        &mut self,
        input: &Path,
        output: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> LumastaticResult<RunReport> {
        if same_file(input, output) {
            return Err(LumastaticError::validation(format!(
                "output '{}' would overwrite the input",
                output.display()
            )));
        }
        check_output_path(output)?;

        let mut source = FfmpegSource::open(input)?;
        let has_audio = source.probe_info().has_audio;
        if !has_audio && self.cfg.missing_audio == MissingAudioPolicy::Fail {
            return Err(LumastaticError::remux(format!(
                "source '{}' has no audio stream",
                input.display()
            )));
        }
        if !has_audio {
            tracing::warn!(input = %input.display(), "source has no audio stream; output will be silent");
        }

        let visual = self.intermediate_path();
        let _visual_guard = TempFileGuard(Some(visual.clone()));
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&visual, self.cfg.intermediate_format));
        let stats = self.run_to_sink(&mut source, &mut sink, progress)?;
        drop(source);

        Remuxer::new(self.cfg.remux_opts()).combine(&visual, input, output)?;
        self.transition(PipelineState::Done);
        tracing::info!(
            frames = stats.frames_written,
            output = %output.display(),
            "render complete"
        );
        Ok(RunReport {
            output: output.to_path_buf(),
            has_audio,
            stats,
        })
    }

    /// Composite the frame at `index` without encoding anything.
    ///
    /// Noise is drawn for every preceding frame too, so with a fixed seed the result
    /// matches frame `index` of a full run.
    pub fn preview_frame(
        &mut self,
        source: &mut dyn FrameSource,
        index: u64,
    ) -> LumastaticResult<OutputFrame> {
        let res = self.preview_frame_inner(source, index);
        let closed = source.close();
        let out = res?;
        closed?;
        Ok(out)
    }

    fn preview_frame_inner(
        &mut self,
        source: &mut dyn FrameSource,
        index: u64,
    ) -> LumastaticResult<OutputFrame> {
        let d = *source.descriptor();
        let static_field = self.noise.generate(d.width, d.height)?;
        let mut dynamic = NoiseField::zeroed(d.width, d.height);
        let mut seen = 0u64;
        while let Some(frame) = source.next_frame()? {
            self.noise.refill(&mut dynamic);
            if seen == index {
                let stage = self.stage();
                return stage.composite(&frame, &static_field, &dynamic);
            }
            seen += 1;
        }
        if seen == 0 {
            return Err(LumastaticError::empty_stream("source yielded no frames"));
        }
        Err(LumastaticError::validation(format!(
            "frame {index} is out of range (source has {seen} frames)"
        )))
    }

    /// Open, stream, and close the sink. Leaves the session in `Finalizing` on success.
    fn run_to_sink(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &mut dyn ProgressObserver,
    ) -> LumastaticResult<RunStats> {
        self.transition(PipelineState::Idle);
        let res = self.run_to_sink_inner(source, sink, progress);
        let closed = source.close();
        let res = res.and_then(|stats| closed.map(|()| stats));
        if res.is_err() {
            self.transition(PipelineState::Failed);
        }
        res
    }

    fn run_to_sink_inner(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &mut dyn ProgressObserver,
    ) -> LumastaticResult<RunStats> {
        let d = *source.descriptor();
        let static_field = self.noise.generate(d.width, d.height)?;
        sink.begin(SinkConfig::from_descriptor(&d))?;
        self.transition(PipelineState::Opened);

        let counters = RunCounters::default();
        progress.on_start(d.frame_count);
        self.transition(PipelineState::Streaming);
        let streamed = if self.cfg.overlap_stages {
            self.stream_overlapped(source, sink, progress, &d, &static_field, &counters)
        } else {
            self.stream_sequential(source, sink, progress, &d, &static_field, &counters)
        };
        progress.on_finish(counters.snapshot(d.frame_count));

        let ended = sink.end();
        streamed?;
        let snap = counters.snapshot(d.frame_count);
        if snap.frames_read == 0 {
            return Err(LumastaticError::empty_stream("source yielded no frames"));
        }
        ended?;
        self.transition(PipelineState::Finalizing);

        let stats = RunStats {
            frames_read: snap.frames_read,
            frames_written: snap.frames_written,
            frames_estimated: d.frame_count,
        };
        if stats.frames_estimated != 0 && stats.frames_estimated != stats.frames_read {
            tracing::warn!(
                estimated = stats.frames_estimated,
                read = stats.frames_read,
                "source frame count differs from its advertised count"
            );
        }
        tracing::debug!(?stats, "stream finished");
        Ok(stats)
    }

    fn stream_sequential(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &mut dyn ProgressObserver,
        d: &VideoStreamDescriptor,
        static_field: &NoiseField,
        counters: &RunCounters,
    ) -> LumastaticResult<()> {
        let mut dynamic = NoiseField::zeroed(d.width, d.height);
        let mut out = OutputFrame::zeroed(d.width, d.height);
        let mut idx = 0u64;
        while let Some(frame) = source.next_frame()? {
            RunCounters::bump(&counters.read);
            self.noise.refill(&mut dynamic);
            self.stage()
                .composite_into(&frame, static_field, &dynamic, &mut out)?;
            RunCounters::bump(&counters.composited);
            sink.push_frame(FrameIndex(idx), &out)?;
            RunCounters::bump(&counters.written);
            idx += 1;
            progress.on_frame(counters.snapshot(d.frame_count));
        }
        Ok(())
    }

    /// Decoder and encoder run on scoped threads joined by bounded queues; compositing
    /// (and noise generation) stays on the calling thread so draws remain in frame order.
    fn stream_overlapped(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &mut dyn ProgressObserver,
        d: &VideoStreamDescriptor,
        static_field: &NoiseField,
        counters: &RunCounters,
    ) -> LumastaticResult<()> {
        let cap = self.cfg.channel_capacity.max(1);
        let stage = CompositeStage {
            compositor: &self.compositor,
            pool: self.pool.as_ref(),
        };
        let noise = &mut self.noise;
        std::thread::scope(|scope| -> LumastaticResult<()> {
            let (frame_tx, frame_rx) = mpsc::sync_channel::<StageMsg<Frame>>(cap);
            let (out_tx, out_rx) = mpsc::sync_channel::<StageMsg<OutputFrame>>(cap);
            let source_ref: &mut dyn FrameSource = source;
            let sink_ref: &mut dyn FrameSink = sink;

            let dec = scope.spawn(move || -> LumastaticResult<()> {
                let mut idx = 0u64;
                while let Some(frame) = source_ref.next_frame()? {
                    RunCounters::bump(&counters.read);
                    if frame_tx.send(StageMsg::Item(FrameIndex(idx), frame)).is_err() {
                        // Compositor stopped; its error is reported instead.
                        return Ok(());
                    }
                    idx += 1;
                }
                let _ = frame_tx.send(StageMsg::End);
                Ok(())
            });

            let enc = scope.spawn(move || -> Result<(), Halt> {
                loop {
                    match out_rx.recv() {
                        Ok(StageMsg::Item(idx, out)) => {
                            sink_ref.push_frame(idx, &out).map_err(Halt::Failed)?;
                            RunCounters::bump(&counters.written);
                        }
                        Ok(StageMsg::End) => return Ok(()),
                        Err(_) => return Err(Halt::Upstream),
                    }
                }
            });

            let composite_res = (|| -> Result<(), Halt> {
                loop {
                    match frame_rx.recv() {
                        Ok(StageMsg::Item(idx, frame)) => {
                            let dynamic =
                                noise.generate(d.width, d.height).map_err(Halt::Failed)?;
                            let out = stage
                                .composite(&frame, static_field, &dynamic)
                                .map_err(Halt::Failed)?;
                            RunCounters::bump(&counters.composited);
                            out_tx
                                .send(StageMsg::Item(idx, out))
                                .map_err(|_| Halt::Downstream)?;
                            progress.on_frame(counters.snapshot(d.frame_count));
                        }
                        Ok(StageMsg::End) => {
                            out_tx.send(StageMsg::End).map_err(|_| Halt::Downstream)?;
                            return Ok(());
                        }
                        Err(_) => return Err(Halt::Upstream),
                    }
                }
            })();
            drop(frame_rx);
            drop(out_tx);

            let dec_res = dec
                .join()
                .map_err(|_| LumastaticError::open("decoder thread panicked"))?;
            let enc_res = enc
                .join()
                .map_err(|_| LumastaticError::write("encoder thread panicked"))?;

            // Report the root cause: a stage that halted because a neighbour went away
            // defers to that neighbour's error.
            dec_res?;
            match composite_res {
                Err(Halt::Failed(e)) => Err(e),
                Err(Halt::Upstream) => Err(LumastaticError::open(
                    "decoder stopped without end-of-stream",
                )),
                Err(Halt::Downstream) | Ok(()) => match enc_res {
                    Err(Halt::Failed(e)) => Err(e),
                    Err(Halt::Upstream) | Err(Halt::Downstream) => Err(LumastaticError::write(
                        "encoder stopped before end-of-stream",
                    )),
                    Ok(()) => Ok(()),
                },
            }
        })
    }

    fn stage(&self) -> CompositeStage<'_> {
        CompositeStage {
            compositor: &self.compositor,
            pool: self.pool.as_ref(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "pipeline state");
            self.state = next;
        }
    }

    fn intermediate_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        self.cfg.temp_dir().join(format!(
            "lumastatic_visual_{}_{nanos}.{}",
            std::process::id(),
            self.cfg.intermediate_format.extension()
        ))
    }
}

/// Compositor plus the pool it runs on, borrowed apart from the noise generator.
#[derive(Clone, Copy)]
struct CompositeStage<'a> {
    compositor: &'a MatteCompositor,
    pool: Option<&'a rayon::ThreadPool>,
}

impl CompositeStage<'_> {
    fn composite(
        &self,
        frame: &Frame,
        static_field: &NoiseField,
        dynamic: &NoiseField,
    ) -> LumastaticResult<OutputFrame> {
        match self.pool {
            Some(pool) => pool.install(|| self.compositor.composite(frame, static_field, dynamic)),
            None => self.compositor.composite(frame, static_field, dynamic),
        }
    }

    fn composite_into(
        &self,
        frame: &Frame,
        static_field: &NoiseField,
        dynamic: &NoiseField,
        out: &mut OutputFrame,
    ) -> LumastaticResult<()> {
        match self.pool {
            Some(pool) => {
                pool.install(|| self.compositor.composite_into(frame, static_field, dynamic, out))
            }
            None => self.compositor.composite_into(frame, static_field, dynamic, out),
        }
    }
}

#[derive(Debug)]
enum StageMsg<T> {
    Item(FrameIndex, T),
    End,
}

/// Why an overlapped stage stopped early.
#[derive(Debug)]
enum Halt {
    /// The upstream queue closed without an end marker.
    Upstream,
    /// The downstream queue stopped accepting items.
    Downstream,
    Failed(LumastaticError),
}

fn build_thread_pool(threads: Option<usize>) -> LumastaticResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(LumastaticError::validation("'threads' must be >= 1 when set"));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build rayon thread pool: {e}").into())
}

/// Whether `a` and `b` name the same file once `.`/`..` segments and symlinks are resolved.
///
/// A path that does not exist yet is resolved through its parent directory.
fn same_file(a: &Path, b: &Path) -> bool {
    match (resolve(a), resolve(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn resolve(p: &Path) -> Option<PathBuf> {
    if let Ok(c) = std::fs::canonicalize(p) {
        return Some(c);
    }
    let name = p.file_name()?;
    let parent = match p.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::canonicalize(parent).ok().map(|d| d.join(name))
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/pipeline.rs"]
mod tests;
