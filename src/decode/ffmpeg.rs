use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use crate::decode::probe::{ProbeInfo, probe_video};
use crate::decode::source::FrameSource;
use crate::foundation::core::VideoStreamDescriptor;
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::raster::frame::Frame;

/// Streaming decoder that spawns the system `ffmpeg` and reads raw RGB24 frames from its stdout.
///
/// Frames are pulled lazily, one at a time. The child process is killed and reaped on
/// [`FrameSource::close`] or drop, whichever comes first.
pub struct FfmpegSource {
    path: PathBuf,
    info: ProbeInfo,
    frame_bytes: usize,

    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    frames_read: u64,
    finished: bool,
}

impl FfmpegSource {
    /// Probe `path` and start decoding its first visual stream.
    pub fn open(path: impl AsRef<Path>) -> LumastaticResult<Self> {
        let path = path.as_ref();
        let info = probe_video(path)?;
        let frame_bytes = Frame::byte_len(info.video.dimensions());

        let mut child = decoder_command(path, info.rotation)
            .spawn()
            .map_err(|e| {
                LumastaticError::open(format!(
                    "failed to spawn ffmpeg decoder (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LumastaticError::open("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| LumastaticError::open("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::debug!(
            path = %path.display(),
            width = info.video.width,
            height = info.video.height,
            rotation = info.rotation,
            fps = info.video.frame_rate.as_f64(),
            frame_count = info.video.frame_count,
            has_audio = info.has_audio,
            "opened ffmpeg frame source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            frame_bytes,
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain: Some(stderr_drain),
            frames_read: 0,
            finished: false,
        })
    }

    /// Full probe result, including audio presence.
    pub fn probe_info(&self) -> &ProbeInfo {
        &self.info
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames decoded so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Reap the decoder after stdout hit EOF and surface a non-zero exit.
    fn finish_decoder(&mut self) -> LumastaticResult<()> {
        self.finished = true;
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| LumastaticError::open(format!("failed to wait for ffmpeg decoder: {e}")))?;
        let stderr = self.join_stderr();
        if !status.success() {
            return Err(LumastaticError::open(format!(
                "ffmpeg decoder exited with status {status} for '{}': {}",
                self.path.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn join_stderr(&mut self) -> String {
        match self.stderr_drain.take().map(JoinHandle::join) {
            Some(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => String::new(),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn descriptor(&self) -> &VideoStreamDescriptor {
        &self.info.video
    }

    fn next_frame(&mut self) -> LumastaticResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(LumastaticError::open("ffmpeg frame source is closed"));
        };

        let mut buf = vec![0u8; self.frame_bytes];
        let filled = read_full(stdout, &mut buf)
            .map_err(|e| LumastaticError::open(format!("failed to read decoded frame: {e}")))?;

        if filled == 0 {
            self.finish_decoder()?;
            return Ok(None);
        }
        if filled < self.frame_bytes {
            let _ = self.finish_decoder();
            return Err(LumastaticError::open(format!(
                "truncated frame {} from '{}': got {filled} of {} bytes",
                self.frames_read,
                self.path.display(),
                self.frame_bytes
            )));
        }

        self.frames_read += 1;
        let v = self.info.video;
        Frame::from_rgb(v.width, v.height, buf).map(Some)
    }

    fn close(&mut self) -> LumastaticResult<()> {
        self.finished = true;
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            // Already-exited children make kill() fail; wait() still reaps them.
            let _ = child.kill();
            child.wait().map_err(|e| {
                LumastaticError::open(format!("failed to reap ffmpeg decoder: {e}"))
            })?;
        }
        let _ = self.join_stderr();
        Ok(())
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Decoder invocation for `path`.
///
/// ffmpeg's own autorotation is turned off and the same quarter turn the probe reported is
/// applied explicitly, so decoded frames always have the probed dimensions.
fn decoder_command(path: &Path, rotation: u32) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
        .arg(path)
        .args(["-map", "0:v:0"]);
    if let Some(filter) = upright_filter(rotation) {
        cmd.args(["-vf", filter]);
    }
    cmd.args([
        "-f", "rawvideo", "-pix_fmt", "rgb24", "-vsync", "passthrough", "pipe:1",
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    cmd
}

fn upright_filter(rotation: u32) -> Option<&'static str> {
    match rotation {
        90 => Some("transpose=clock"),
        180 => Some("hflip,vflip"),
        270 => Some("transpose=cclock"),
        _ => None,
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
