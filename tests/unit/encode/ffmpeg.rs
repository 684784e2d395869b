use super::*;
use crate::foundation::core::Fps;

fn cfg(width: u32, height: u32) -> SinkConfig {
    SinkConfig {
        width,
        height,
        fps: Fps::new(30, 1).unwrap(),
    }
}

fn args_of(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn config_validation_catches_bad_values() {
    let avi = FfmpegSink::new(FfmpegSinkOpts::new("out/x.avi", ContainerFormat::Avi));
    assert!(avi.validate_config(&cfg(0, 10)).is_err());
    assert!(avi.validate_config(&cfg(11, 10)).is_err());
    assert!(avi.validate_config(&cfg(10, 10)).is_ok());

    let mkv = FfmpegSink::new(FfmpegSinkOpts::new("out/x.mkv", ContainerFormat::Mkv));
    assert!(mkv.validate_config(&cfg(11, 7)).is_ok());
    let err = mkv.validate_config(&cfg(0, 0)).unwrap_err();
    assert!(matches!(err, LumastaticError::Write(_)));
}

#[test]
fn command_streams_gray_rawvideo_without_audio() {
    let sink = FfmpegSink::new(FfmpegSinkOpts::new("out/x.avi", ContainerFormat::Avi));
    let args = args_of(&sink.build_command(&SinkConfig {
        width: 4,
        height: 2,
        fps: Fps::new(30000, 1001).unwrap(),
    }));
    let joined = args.join(" ");
    assert!(joined.starts_with("-y "));
    assert!(joined.contains("-f rawvideo -pix_fmt gray -s 4x2 -r 30000/1001 -i pipe:0 -an"));
    assert!(joined.contains("-c:v mpeg4 -vtag xvid"));
    assert_eq!(args.last().map(String::as_str), Some("out/x.avi"));
}

#[test]
fn command_runs_configured_encoder_and_overwrites_reserved_file() {
    let mut opts = FfmpegSinkOpts::new("x.mkv", ContainerFormat::Mkv);
    opts.overwrite = false;
    opts.ffmpeg = PathBuf::from("/opt/ffmpeg/bin/ffmpeg");
    let cmd = FfmpegSink::new(opts).build_command(&cfg(2, 2));
    assert_eq!(cmd.get_program(), "/opt/ffmpeg/bin/ffmpeg");
    let args = args_of(&cmd);
    assert_eq!(args[0], "-y");
    assert!(args.join(" ").contains("-c:v ffv1 -pix_fmt gray"));
}

/// Stand-in encoder: honours `-n` the way ffmpeg does and copies stdin to the output path.
#[cfg(unix)]
const FAKE_ENCODER: &str = r#"if [ "$1" = "-version" ]; then exit 0; fi
keep=""
out=""
for a in "$@"; do
  if [ "$a" = "-n" ]; then keep=1; fi
  out="$a"
done
if [ -n "$keep" ] && [ -e "$out" ]; then
  echo "File '$out' already exists. Exiting." >&2
  exit 1
fi
cat > "$out"
"#;

#[cfg(unix)]
#[test]
fn no_overwrite_sink_writes_fresh_path_and_refuses_existing_one() {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = crate::test_support::write_script(dir.path(), "ffmpeg", FAKE_ENCODER);
    let out = dir.path().join("fresh.mkv");
    let opts = FfmpegSinkOpts {
        out_path: out.clone(),
        format: ContainerFormat::Mkv,
        overwrite: false,
        ffmpeg,
    };

    let mut sink = FfmpegSink::new(opts.clone());
    sink.begin(cfg(2, 2)).unwrap();
    sink.push_frame(FrameIndex(0), &OutputFrame::zeroed(2, 2))
        .unwrap();
    sink.push_frame(FrameIndex(1), &OutputFrame::zeroed(2, 2))
        .unwrap();
    sink.end().unwrap();
    assert_eq!(sink.frames_written(), 2);
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 8);

    let mut again = FfmpegSink::new(opts);
    let err = again.begin(cfg(2, 2)).unwrap_err();
    assert!(matches!(err, LumastaticError::Write(_)), "{err}");
    assert!(err.to_string().contains("already exists"), "{err}");
    again.end().unwrap();
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 8);
}

#[test]
fn missing_encoder_leaves_no_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never.mkv");
    let mut opts = FfmpegSinkOpts::new(&out, ContainerFormat::Mkv);
    opts.overwrite = false;
    opts.ffmpeg = dir.path().join("no-such-ffmpeg");
    let err = FfmpegSink::new(opts).begin(cfg(2, 2)).unwrap_err();
    assert!(matches!(err, LumastaticError::Write(_)), "{err}");
    assert!(!out.exists());
}

#[test]
fn container_format_parses_and_names_extension() {
    assert_eq!("AVI".parse::<ContainerFormat>().unwrap(), ContainerFormat::Avi);
    assert_eq!("mkv".parse::<ContainerFormat>().unwrap().extension(), "mkv");
    assert_eq!(ContainerFormat::Mp4.extension(), "mp4");
    assert!("webm".parse::<ContainerFormat>().is_err());
    assert!(!ContainerFormat::Mkv.requires_even_dimensions());
}

#[test]
fn begin_on_unwritable_path_is_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();

    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(
        blocker.join("out.avi"),
        ContainerFormat::Avi,
    ));
    let err = sink.begin(cfg(4, 4)).unwrap_err();
    assert!(matches!(err, LumastaticError::Write(_)), "{err}");
    // end after a failed begin is a no-op.
    sink.end().unwrap();
}

#[test]
fn push_before_begin_is_rejected() {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new("x.avi", ContainerFormat::Avi));
    let err = sink
        .push_frame(FrameIndex(0), &OutputFrame::zeroed(2, 2))
        .unwrap_err();
    assert!(err.to_string().contains("not started"));
}
