use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Dimensions, FrameIndex};
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::plane::OutputFrame;

/// Container + codec used for an encoded file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// AVI with MPEG-4 Part 2 video tagged `XVID`.
    #[default]
    Avi,
    /// Matroska with lossless FFV1 in 8-bit gray.
    Mkv,
    /// MP4 with H.264 in yuv420p.
    Mp4,
}

impl ContainerFormat {
    /// File extension (without the dot).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Avi => "avi",
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
        }
    }

    /// Whether the video codec stores yuv420p, which needs even dimensions.
    pub fn requires_even_dimensions(self) -> bool {
        matches!(self, Self::Avi | Self::Mp4)
    }

    fn codec_args(self) -> &'static [&'static str] {
        match self {
            Self::Avi => &[
                "-c:v", "mpeg4", "-vtag", "xvid", "-q:v", "2", "-pix_fmt", "yuv420p",
            ],
            Self::Mkv => &["-c:v", "ffv1", "-pix_fmt", "gray"],
            Self::Mp4 => &[
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ],
        }
    }
}

impl std::str::FromStr for ContainerFormat {
    type Err = LumastaticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avi" => Ok(Self::Avi),
            "mkv" => Ok(Self::Mkv),
            "mp4" => Ok(Self::Mp4),
            other => Err(LumastaticError::validation(format!(
                "unknown container format '{other}' (expected avi, mkv or mp4)"
            ))),
        }
    }
}

/// Options for [`FfmpegSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Output file path.
    pub out_path: PathBuf,
    /// Container and codec.
    pub format: ContainerFormat,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// Encoder executable; a bare name is looked up on `PATH`.
    pub ffmpeg: PathBuf,
}

impl FfmpegSinkOpts {
    /// Options for writing `format` to `out_path`, overwriting.
    pub fn new(out_path: impl Into<PathBuf>, format: ContainerFormat) -> Self {
        Self {
            out_path: out_path.into(),
            format,
            overwrite: true,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams 8-bit gray frames to its stdin.
///
/// The output has no audio stream.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
    frames_written: u64,
}

impl FfmpegSink {
    /// Create a new sink that streams into `ffmpeg`.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
            frames_written: 0,
        }
    }

    /// Output path this sink writes.
    pub fn out_path(&self) -> &Path {
        &self.opts.out_path
    }

    /// Frames accepted since `begin`.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Validate `cfg` for this sink's container without spawning anything.
    pub fn validate_config(&self, cfg: &SinkConfig) -> LumastaticResult<()> {
        let dims = Dimensions {
            width: cfg.width,
            height: cfg.height,
        };
        if dims.is_empty() {
            return Err(LumastaticError::write(format!(
                "ffmpeg sink width/height must be non-zero (got {}x{})",
                cfg.width, cfg.height
            )));
        }
        if self.opts.format.requires_even_dimensions() && !dims.is_even() {
            return Err(LumastaticError::write(format!(
                "{} output needs even width/height for yuv420p (got {}x{}); use mkv instead",
                self.opts.format.extension(),
                cfg.width,
                cfg.height
            )));
        }
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(LumastaticError::write("ffmpeg sink fps must be non-zero"));
        }
        Ok(())
    }

    fn build_command(&self, cfg: &SinkConfig) -> Command {
        let mut cmd = Command::new(&self.opts.ffmpeg);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // `begin` has already created (or refused) the output file, so ffmpeg always overwrites it.
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "gray",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            // For rawvideo input `-r` must precede `-i`.
            "-r",
            &cfg.fps.to_ffmpeg_arg(),
            "-i",
            "pipe:0",
            "-an",
        ]);
        cmd.args(self.opts.format.codec_args());
        cmd.arg(&self.opts.out_path);
        cmd
    }

    fn spawn_encoder(&mut self, cfg: &SinkConfig) -> LumastaticResult<()> {
        if !is_runnable(&self.opts.ffmpeg) {
            return Err(LumastaticError::write(format!(
                "ffmpeg is required for encoding, but '{}' could not be run",
                self.opts.ffmpeg.display()
            )));
        }

        let mut child = self.build_command(cfg).spawn().map_err(|e| {
            LumastaticError::write(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LumastaticError::write("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| LumastaticError::write("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        Ok(())
    }

    /// Reap the child after stdin was closed; returns its exit status error, if any.
    fn reap(&mut self) -> LumastaticResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| LumastaticError::write(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| LumastaticError::write("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| LumastaticError::write(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(LumastaticError::write(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> LumastaticResult<()> {
        if self.cfg.is_some() {
            return Err(LumastaticError::write("ffmpeg sink already started"));
        }
        self.validate_config(&cfg)?;

        ensure_parent_dir(&self.opts.out_path)?;
        // Surface an unwritable or taken destination here rather than as a broken pipe mid-stream.
        let mut open = std::fs::OpenOptions::new();
        open.write(true);
        if self.opts.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        open.open(&self.opts.out_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                LumastaticError::write(format!(
                    "output file '{}' already exists",
                    self.opts.out_path.display()
                ))
            } else {
                LumastaticError::write(format!(
                    "cannot create '{}': {e}",
                    self.opts.out_path.display()
                ))
            }
        })?;

        if let Err(e) = self.spawn_encoder(&cfg) {
            let _ = std::fs::remove_file(&self.opts.out_path);
            return Err(e);
        }
        self.cfg = Some(cfg);
        self.last_idx = None;
        self.frames_written = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &OutputFrame) -> LumastaticResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| LumastaticError::write("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(LumastaticError::write(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(LumastaticError::write(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != cfg.width as usize * cfg.height as usize {
            return Err(LumastaticError::write(
                "frame.data size mismatch with width*height",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(LumastaticError::write("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        if let Err(e) = stdin.write_all(&frame.data) {
            // The encoder died; its stderr explains why better than EPIPE does.
            let reason = match self.reap() {
                Err(exit) => exit.to_string(),
                Ok(()) => String::new(),
            };
            return Err(LumastaticError::write(format!(
                "failed to write frame {} to ffmpeg stdin: {e} {reason}",
                idx.0
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn end(&mut self) -> LumastaticResult<()> {
        if self.cfg.take().is_none() {
            return Ok(());
        }
        self.reap()
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> LumastaticResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            LumastaticError::write(format!(
                "failed to create output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// Return `true` when `program -version` runs and exits successfully.
pub fn is_runnable(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
