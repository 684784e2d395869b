use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::effects::matte::{DEFAULT_LUMA_THRESHOLD, MatteCompositor};
use crate::encode::ffmpeg::ContainerFormat;
use crate::encode::remux::{MissingAudioPolicy, RemuxOpts};
use crate::foundation::error::{LumastaticError, LumastaticResult};
use crate::noise::generator::{NoiseDepth, NoiseGenerator};
use crate::raster::luma::LumaMode;

/// Everything that shapes one effect run.
///
/// Loads from JSON; absent fields take their defaults, unknown fields are rejected.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EffectConfig {
    /// Pixels with luminance strictly above this are foreground.
    pub luma_threshold: u8,
    /// RGB to luminance conversion.
    pub luma_mode: LumaMode,
    /// Noise sample alphabet.
    pub noise_depth: NoiseDepth,
    /// Fixed noise seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Container of the temporary visual-only file.
    pub intermediate_format: ContainerFormat,
    /// Container used when output names are derived rather than given.
    pub output_format: ContainerFormat,
    /// Audio codec for the remuxed output.
    pub audio_codec: String,
    /// Audio bitrate for the remuxed output.
    pub audio_bitrate: Option<String>,
    /// Behavior when the source has no audio.
    pub missing_audio: MissingAudioPolicy,
    /// Remux timeout in seconds; `None` waits indefinitely.
    pub remux_timeout_secs: Option<u64>,
    /// Overlap decode, composite and encode on separate threads.
    pub overlap_stages: bool,
    /// Bounded queue depth between overlapped stages.
    pub channel_capacity: usize,
    /// Split each frame's rows across rayon workers.
    pub parallel_pixels: bool,
    /// Worker count for `parallel_pixels`; `None` uses the rayon default.
    pub threads: Option<usize>,
    /// Directory for the intermediate file; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            luma_mode: LumaMode::Rec601,
            noise_depth: NoiseDepth::Bits8,
            seed: None,
            intermediate_format: ContainerFormat::Avi,
            output_format: ContainerFormat::Avi,
            audio_codec: "aac".to_string(),
            audio_bitrate: None,
            missing_audio: MissingAudioPolicy::Omit,
            remux_timeout_secs: Some(600),
            overlap_stages: false,
            channel_capacity: 4,
            parallel_pixels: false,
            threads: None,
            temp_dir: None,
        }
    }
}

impl EffectConfig {
    /// Read and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> LumastaticResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json(&text).map_err(|e| match e {
            LumastaticError::Validation(msg) => {
                LumastaticError::validation(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(text: &str) -> LumastaticResult<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| LumastaticError::validation(format!("invalid config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> LumastaticResult<()> {
        if self.channel_capacity == 0 {
            return Err(LumastaticError::validation(
                "channel_capacity must be >= 1",
            ));
        }
        if self.threads == Some(0) {
            return Err(LumastaticError::validation("threads must be >= 1 when set"));
        }
        if self.audio_codec.trim().is_empty() {
            return Err(LumastaticError::validation("audio_codec must not be empty"));
        }
        if self.remux_timeout_secs == Some(0) {
            return Err(LumastaticError::validation(
                "remux_timeout_secs must be >= 1 when set",
            ));
        }
        Ok(())
    }

    /// Compositor described by this config.
    pub fn compositor(&self) -> MatteCompositor {
        MatteCompositor::new(self.luma_threshold, self.luma_mode).with_parallel(self.parallel_pixels)
    }

    /// Noise generator described by this config.
    pub fn noise_generator(&self) -> NoiseGenerator {
        NoiseGenerator::new(self.seed, self.noise_depth)
    }

    /// Remux options described by this config.
    pub fn remux_opts(&self) -> RemuxOpts {
        RemuxOpts {
            audio_codec: self.audio_codec.clone(),
            audio_bitrate: self.audio_bitrate.clone(),
            missing_audio: self.missing_audio,
            timeout: self.remux_timeout_secs.map(Duration::from_secs),
            ..RemuxOpts::default()
        }
    }

    /// Directory for intermediate files.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/config.rs"]
mod tests;
