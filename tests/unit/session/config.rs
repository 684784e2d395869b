use super::*;

#[test]
fn defaults_match_documented_values() {
    let cfg = EffectConfig::default();
    assert_eq!(cfg.luma_threshold, 127);
    assert_eq!(cfg.luma_mode, LumaMode::Rec601);
    assert_eq!(cfg.noise_depth, NoiseDepth::Bits8);
    assert_eq!(cfg.intermediate_format, ContainerFormat::Avi);
    assert_eq!(cfg.audio_codec, "aac");
    assert_eq!(cfg.missing_audio, MissingAudioPolicy::Omit);
    assert!(!cfg.overlap_stages);
    cfg.validate().unwrap();
}

#[test]
fn empty_json_is_all_defaults() {
    assert_eq!(EffectConfig::from_json("{}").unwrap(), EffectConfig::default());
}

#[test]
fn json_overrides_fields() {
    let cfg = EffectConfig::from_json(
        r#"{
            "luma_threshold": 64,
            "luma_mode": "average",
            "noise_depth": "bits1",
            "seed": 7,
            "intermediate_format": "mkv",
            "missing_audio": "fail",
            "remux_timeout_secs": null,
            "overlap_stages": true,
            "channel_capacity": 2
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.luma_threshold, 64);
    assert_eq!(cfg.luma_mode, LumaMode::Average);
    assert_eq!(cfg.noise_depth, NoiseDepth::Bits1);
    assert_eq!(cfg.seed, Some(7));
    assert_eq!(cfg.intermediate_format, ContainerFormat::Mkv);
    assert_eq!(cfg.remux_opts().missing_audio, MissingAudioPolicy::Fail);
    assert_eq!(cfg.remux_opts().timeout, None);
    assert!(cfg.overlap_stages);
}

#[test]
fn unknown_fields_and_out_of_range_values_are_rejected() {
    assert!(EffectConfig::from_json(r#"{"threshold": 10}"#).is_err());
    assert!(EffectConfig::from_json(r#"{"luma_threshold": 300}"#).is_err());
    assert!(EffectConfig::from_json(r#"{"channel_capacity": 0}"#).is_err());
    assert!(EffectConfig::from_json(r#"{"threads": 0}"#).is_err());
    let err = EffectConfig::from_json(r#"{"audio_codec": " "}"#).unwrap_err();
    assert!(matches!(err, LumastaticError::Validation(_)));
}

#[test]
fn from_path_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("effect.json");
    std::fs::write(&p, r#"{"luma_threshold": 200}"#).unwrap();
    assert_eq!(EffectConfig::from_path(&p).unwrap().luma_threshold, 200);
    assert!(EffectConfig::from_path(dir.path().join("missing.json")).is_err());
}

#[test]
fn compositor_and_remux_opts_follow_config() {
    let cfg = EffectConfig {
        luma_threshold: 10,
        parallel_pixels: true,
        audio_bitrate: Some("128k".to_string()),
        ..EffectConfig::default()
    };
    let c = cfg.compositor();
    assert_eq!(c.threshold, 10);
    assert!(c.parallel);
    assert_eq!(cfg.remux_opts().audio_bitrate.as_deref(), Some("128k"));
    assert_eq!(cfg.remux_opts().timeout, Some(Duration::from_secs(600)));
}
