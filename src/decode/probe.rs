use std::path::Path;
use std::process::Command;

use crate::foundation::core::{Fps, VideoStreamDescriptor};
use crate::foundation::error::{LumastaticError, LumastaticResult};

/// Stream metadata of a container, as reported by `ffprobe`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ProbeInfo {
    /// First visual stream, with its dimensions as displayed (after rotation).
    pub video: VideoStreamDescriptor,
    /// Clockwise rotation in degrees (0, 90, 180 or 270) that turns coded frames upright.
    pub rotation: u32,
    /// Whether the container carries at least one audio stream.
    pub has_audio: bool,
    /// Container duration in seconds (0 when unknown).
    pub duration_sec: f64,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    tags: Option<ProbeTags>,
}

#[derive(serde::Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(serde::Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    fn clockwise_rotation(&self) -> u32 {
        // The display matrix angle is counter-clockwise; the legacy `rotate` tag is clockwise.
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .map(|r| -r)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .unwrap_or(0.0);
        let quarter_turns = (degrees / 90.0).round() as i64;
        quarter_turns.rem_euclid(4) as u32 * 90
    }
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Run `ffprobe` on `source_path` and read the first visual stream's metadata.
///
/// Every failure here is an [`LumastaticError::Open`].
pub fn probe_video(source_path: &Path) -> LumastaticResult<ProbeInfo> {
    if !source_path.is_file() {
        return Err(LumastaticError::open(format!(
            "source '{}' does not exist or is not a file",
            source_path.display()
        )));
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| LumastaticError::open(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(LumastaticError::open(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    parse_probe_json(&out.stdout).map_err(|e| match e {
        LumastaticError::Open(msg) => {
            LumastaticError::open(format!("'{}': {msg}", source_path.display()))
        }
        other => other,
    })
}

pub(crate) fn parse_probe_json(bytes: &[u8]) -> LumastaticResult<ProbeInfo> {
    let parsed: ProbeOut = serde_json::from_slice(bytes)
        .map_err(|e| LumastaticError::open(format!("ffprobe json parse failed: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| LumastaticError::open("no video stream found"))?;
    let coded_width = video
        .width
        .ok_or_else(|| LumastaticError::open("missing video width from ffprobe"))?;
    let coded_height = video
        .height
        .ok_or_else(|| LumastaticError::open("missing video height from ffprobe"))?;
    let rotation = video.clockwise_rotation();
    let (width, height) = if rotation % 180 == 90 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    // avg_frame_rate is "0/0" for some containers; fall back to the nominal rate.
    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(Fps::parse_ratio)
        .or_else(|| video.r_frame_rate.as_deref().and_then(Fps::parse_ratio))
        .ok_or_else(|| LumastaticError::open("invalid video frame rate"))?;

    let stream_duration = video
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok());
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .or(stream_duration)
        .unwrap_or(0.0);

    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| frame_rate.frames_in_secs(stream_duration.unwrap_or(duration_sec)));

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let video = VideoStreamDescriptor::new(width, height, frame_rate, frame_count)
        .map_err(|e| LumastaticError::open(e.to_string()))?;
    Ok(ProbeInfo {
        video,
        rotation,
        has_audio,
        duration_sec,
    })
}

/// Return `true` when `ffprobe` can be invoked from `PATH`.
pub fn is_ffprobe_on_path() -> bool {
    Command::new("ffprobe")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/decode/probe.rs"]
mod tests;
