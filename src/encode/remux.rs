use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::encode::ffmpeg::{ensure_parent_dir, is_runnable};
use crate::foundation::error::{LumastaticError, LumastaticResult};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What to do when the audio source has no audio stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAudioPolicy {
    /// Produce the output without an audio stream.
    #[default]
    Omit,
    /// Fail with a remux error.
    Fail,
}

/// Options for [`Remuxer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemuxOpts {
    /// Audio codec passed to `-c:a`.
    pub audio_codec: String,
    /// Optional audio bitrate passed to `-b:a` (e.g. `"192k"`).
    pub audio_bitrate: Option<String>,
    /// Behavior when the source has no audio.
    pub missing_audio: MissingAudioPolicy,
    /// Kill the transcoder after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Transcoder executable; a bare name is looked up on `PATH`.
    pub ffmpeg: PathBuf,
}

impl Default for RemuxOpts {
    fn default() -> Self {
        Self {
            audio_codec: "aac".to_string(),
            audio_bitrate: None,
            missing_audio: MissingAudioPolicy::Omit,
            timeout: Some(Duration::from_secs(600)),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

/// Joins a visual-only file with the first audio stream of another file using the system `ffmpeg`.
///
/// The visual stream is copied without re-encoding; audio is re-encoded with
/// [`RemuxOpts::audio_codec`].
#[derive(Clone, Debug, Default)]
pub struct Remuxer {
    opts: RemuxOpts,
}

impl Remuxer {
    /// Create a remuxer.
    pub fn new(opts: RemuxOpts) -> Self {
        Self { opts }
    }

    /// Options in use.
    pub fn opts(&self) -> &RemuxOpts {
        &self.opts
    }

    /// Combine `visual_only` with the audio of `audio_source` into `output`.
    ///
    /// `output` is replaced only when `ffmpeg` succeeds; on failure it is left as it was.
    /// `visual_only` is removed in every case.
    #[tracing::instrument(skip(self), fields(codec = %self.opts.audio_codec))]
    pub fn combine(
        &self,
        visual_only: &Path,
        audio_source: &Path,
        output: &Path,
    ) -> LumastaticResult<()> {
        let res = self.combine_keep_input(visual_only, audio_source, output);
        if let Err(e) = std::fs::remove_file(visual_only)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %visual_only.display(), "failed to remove intermediate: {e}");
        }
        res
    }

    fn combine_keep_input(
        &self,
        visual_only: &Path,
        audio_source: &Path,
        output: &Path,
    ) -> LumastaticResult<()> {
        check_output_path(output)?;
        if !visual_only.is_file() {
            return Err(LumastaticError::remux(format!(
                "visual-only input '{}' does not exist",
                visual_only.display()
            )));
        }
        if !audio_source.is_file() {
            return Err(LumastaticError::remux(format!(
                "audio source '{}' does not exist",
                audio_source.display()
            )));
        }
        if !is_runnable(&self.opts.ffmpeg) {
            return Err(LumastaticError::remux(format!(
                "ffmpeg is required for remuxing, but '{}' could not be run",
                self.opts.ffmpeg.display()
            )));
        }
        ensure_parent_dir(output).map_err(|e| LumastaticError::remux(e.to_string()))?;

        let staging = staging_path(output);
        let mut staged = StagingGuard(Some(staging.clone()));
        let args = self.build_args(visual_only, audio_source, &staging);
        self.run_ffmpeg(&args)?;

        std::fs::rename(&staging, output).map_err(|e| {
            LumastaticError::remux(format!(
                "failed to move '{}' into place at '{}': {e}",
                staging.display(),
                output.display()
            ))
        })?;
        staged.0 = None;
        Ok(())
    }

    pub(crate) fn build_args(
        &self,
        visual_only: &Path,
        audio_source: &Path,
        output: &Path,
    ) -> Vec<OsString> {
        let audio_map = match self.opts.missing_audio {
            // The trailing `?` makes the mapping optional.
            MissingAudioPolicy::Omit => "1:a:0?",
            MissingAudioPolicy::Fail => "1:a:0",
        };
        let mut args: Vec<OsString> = ["-y", "-loglevel", "error", "-nostdin", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(visual_only.into());
        args.push("-i".into());
        args.push(audio_source.into());
        for a in ["-map", "0:v:0", "-map", audio_map, "-c:v", "copy", "-c:a"] {
            args.push(a.into());
        }
        args.push(self.opts.audio_codec.as_str().into());
        if let Some(bitrate) = self.opts.audio_bitrate.as_deref() {
            args.push("-b:a".into());
            args.push(bitrate.into());
        }
        args.push(output.into());
        args
    }

    fn run_ffmpeg(&self, args: &[OsString]) -> LumastaticResult<()> {
        let mut child = Command::new(&self.opts.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LumastaticError::remux(format!("failed to spawn ffmpeg: {e}")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| LumastaticError::remux("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = stderr.read_to_end(&mut bytes);
            bytes
        });

        let deadline = self.opts.timeout.map(|t| Instant::now() + t);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LumastaticError::remux(format!(
                        "failed to wait for ffmpeg: {e}"
                    )));
                }
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LumastaticError::remux(format!(
                    "ffmpeg did not finish within {:?}; killed",
                    self.opts.timeout.unwrap_or_default()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_drain.join().unwrap_or_default();
        if !status.success() {
            return Err(LumastaticError::remux(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Reject outputs whose muxer `ffmpeg` could not infer from the file name.
pub(crate) fn check_output_path(output: &Path) -> LumastaticResult<()> {
    match output.extension() {
        Some(ext) if !ext.is_empty() => Ok(()),
        _ => Err(LumastaticError::validation(format!(
            "output '{}' needs a file extension (e.g. .mkv)",
            output.display()
        ))),
    }
}

/// Sibling of `output` that keeps its extension, so `ffmpeg` picks the same muxer.
pub(crate) fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{}.partial-{name}", std::process::id()))
}

struct StagingGuard(Option<PathBuf>);

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/remux.rs"]
mod tests;
