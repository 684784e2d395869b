//! Source acquisition: turn a user-supplied selector into a readable local video file.
//!
//! The pipeline only ever sees the returned path.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::foundation::error::{LumastaticError, LumastaticResult};

/// Capability to resolve a selector (path, URL, ...) to a local file.
pub trait SourceAcquirer {
    /// Produce a local, readable video file for `selector`.
    fn acquire(&self, selector: &str) -> LumastaticResult<PathBuf>;
}

/// Treats the selector as a path to an existing local file.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFile;

impl SourceAcquirer for LocalFile {
    fn acquire(&self, selector: &str) -> LumastaticResult<PathBuf> {
        let path = PathBuf::from(selector);
        if !path.is_file() {
            return Err(LumastaticError::acquire(format!(
                "'{selector}' is not an existing file"
            )));
        }
        Ok(path)
    }
}

/// Downloads a URL with an external `yt-dlp`-compatible program.
///
/// Picks the best progressive MP4 (audio and video in one stream) and stores it as
/// `<dir>/<stem>.mp4`.
#[derive(Clone, Debug)]
pub struct YtDlp {
    /// Program to run.
    pub program: PathBuf,
    /// Download directory, created on demand.
    pub dir: PathBuf,
    /// File stem for the downloaded file.
    pub stem: String,
}

/// Format selector for a progressive MP4, highest resolution first.
const PROGRESSIVE_MP4: &str = "best[ext=mp4][vcodec!=none][acodec!=none]";

impl YtDlp {
    /// Download into `dir` as `<stem>.mp4` using `yt-dlp` from `PATH`.
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    /// Destination path of the download.
    pub fn target_path(&self) -> PathBuf {
        self.dir.join(format!("{}.mp4", self.stem))
    }

    pub(crate) fn build_command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--no-playlist", "--quiet", "--no-progress", "-f", PROGRESSIVE_MP4, "-o"])
            .arg(self.target_path())
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl SourceAcquirer for YtDlp {
    #[tracing::instrument(skip(self), fields(dir = %self.dir.display(), stem = %self.stem))]
    fn acquire(&self, selector: &str) -> LumastaticResult<PathBuf> {
        if self.stem.trim().is_empty() || self.stem.contains(['/', '\\']) {
            return Err(LumastaticError::acquire(format!(
                "invalid file stem '{}'",
                self.stem
            )));
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            LumastaticError::acquire(format!(
                "failed to create download directory '{}': {e}",
                self.dir.display()
            ))
        })?;

        let out = self.build_command(selector).output().map_err(|e| {
            LumastaticError::acquire(format!(
                "failed to run '{}' (is it installed and on PATH?): {e}",
                self.program.display()
            ))
        })?;
        if !out.status.success() {
            return Err(LumastaticError::acquire(format!(
                "download of '{selector}' failed with status {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let path = self.target_path();
        if !path.is_file() {
            return Err(LumastaticError::acquire(format!(
                "no progressive mp4 stream was downloaded for '{selector}'"
            )));
        }
        tracing::info!(path = %path.display(), "downloaded source video");
        Ok(path)
    }
}

/// Whether `selector` looks like a URL rather than a local path.
pub fn is_url(selector: &str) -> bool {
    let s = selector.trim_start().to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://")
}

/// File stem of a local path, used to name outputs.
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}
