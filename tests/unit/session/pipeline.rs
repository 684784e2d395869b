use super::*;
use crate::decode::source::InMemorySource;
use crate::encode::sink::InMemorySink;
use crate::foundation::core::Fps;
use crate::noise::generator::NoiseDepth;
use crate::session::progress::{NoProgress, ProgressUpdate};

const W: u32 = 4;
const H: u32 = 4;

fn descriptor(frame_count: u64) -> VideoStreamDescriptor {
    VideoStreamDescriptor::new(W, H, Fps::new(1, 1).unwrap(), frame_count).unwrap()
}

fn alternating(n: usize) -> Vec<Frame> {
    (0..n)
        .map(|i| {
            if i % 2 == 0 {
                Frame::solid(W, H, [0, 0, 0])
            } else {
                Frame::solid(W, H, [255, 255, 255])
            }
        })
        .collect()
}

fn seeded_cfg(overlap: bool) -> EffectConfig {
    EffectConfig {
        seed: Some(9),
        overlap_stages: overlap,
        channel_capacity: 2,
        ..EffectConfig::default()
    }
}

#[derive(Default)]
struct Recorder {
    started: Option<u64>,
    frames: Vec<ProgressUpdate>,
    finished: Option<ProgressUpdate>,
}

impl ProgressObserver for Recorder {
    fn on_start(&mut self, estimated_frames: u64) {
        self.started = Some(estimated_frames);
    }
    fn on_frame(&mut self, update: ProgressUpdate) {
        self.frames.push(update);
    }
    fn on_finish(&mut self, update: ProgressUpdate) {
        self.finished = Some(update);
    }
}

/// Yields `ok_frames` frames, then fails.
struct BrokenSource {
    descriptor: VideoStreamDescriptor,
    ok_frames: u64,
    closed: bool,
}

impl FrameSource for BrokenSource {
    fn descriptor(&self) -> &VideoStreamDescriptor {
        &self.descriptor
    }
    fn next_frame(&mut self) -> LumastaticResult<Option<Frame>> {
        if self.ok_frames == 0 {
            return Err(LumastaticError::open("decoder exited with status 1"));
        }
        self.ok_frames -= 1;
        Ok(Some(Frame::solid(W, H, [10, 10, 10])))
    }
    fn close(&mut self) -> LumastaticResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[test]
fn dark_frames_get_static_noise_and_bright_frames_get_fresh_noise() {
    let mut session = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(10), alternating(10)).unwrap();
    let mut sink = InMemorySink::new();
    let stats = session
        .process(&mut source, &mut sink, &mut NoProgress)
        .unwrap();

    assert_eq!(
        stats,
        RunStats {
            frames_read: 10,
            frames_written: 10,
            frames_estimated: 10,
        }
    );
    assert_eq!(session.state(), PipelineState::Done);
    assert!(source.is_closed());
    assert_eq!(sink.lifecycle_calls(), (1, 1));

    // Same draw order as the session: static once, then one dynamic field per frame.
    let mut replay = NoiseGenerator::seeded(9, NoiseDepth::Bits8);
    let static_field = replay.generate(W, H).unwrap();
    let frames = sink.frames();
    assert_eq!(frames.len(), 10);
    for (i, (idx, out)) in frames.iter().enumerate() {
        let dynamic = replay.generate(W, H).unwrap();
        assert_eq!(idx.0, i as u64);
        if i % 2 == 0 {
            assert_eq!(out.data, static_field.data, "frame {i}");
        } else {
            assert_eq!(out.data, dynamic.data, "frame {i}");
        }
    }
}

#[test]
fn every_dark_frame_shares_one_static_field() {
    let mut session = EffectSession::new(EffectConfig::default()).unwrap();
    let frames = vec![Frame::solid(W, H, [20, 20, 20]); 3];
    let mut source = InMemorySource::new(descriptor(3), frames).unwrap();
    let mut sink = InMemorySink::new();
    session
        .process(&mut source, &mut sink, &mut NoProgress)
        .unwrap();
    let out = sink.frames();
    assert_eq!(out[0].1, out[1].1);
    assert_eq!(out[1].1, out[2].1);
}

#[test]
fn overlapped_stages_match_sequential_output() {
    let run = |overlap: bool| {
        let mut session = EffectSession::new(seeded_cfg(overlap)).unwrap();
        let mut source = InMemorySource::new(descriptor(10), alternating(10)).unwrap();
        let mut sink = InMemorySink::new();
        let stats = session
            .process(&mut source, &mut sink, &mut NoProgress)
            .unwrap();
        assert!(source.is_closed());
        assert_eq!(sink.lifecycle_calls(), (1, 1));
        (stats, sink.frames().to_vec())
    };
    let (seq_stats, seq) = run(false);
    let (par_stats, par) = run(true);
    assert_eq!(seq_stats, par_stats);
    assert_eq!(seq, par);
}

#[test]
fn parallel_pixels_on_dedicated_pool_match_sequential_output() {
    let mut cfg = seeded_cfg(false);
    let mut a = EffectSession::new(cfg.clone()).unwrap();
    cfg.parallel_pixels = true;
    cfg.threads = Some(2);
    let mut b = EffectSession::new(cfg).unwrap();

    let mut out = Vec::new();
    for session in [&mut a, &mut b] {
        let mut source = InMemorySource::new(descriptor(4), alternating(4)).unwrap();
        let mut sink = InMemorySink::new();
        session
            .process(&mut source, &mut sink, &mut NoProgress)
            .unwrap();
        out.push(sink.frames().to_vec());
    }
    assert_eq!(out[0], out[1]);
}

#[test]
fn empty_source_is_an_empty_stream_error() {
    for overlap in [false, true] {
        let mut session = EffectSession::new(seeded_cfg(overlap)).unwrap();
        let mut source = InMemorySource::new(descriptor(0), Vec::new()).unwrap();
        let mut sink = InMemorySink::new();
        let err = session
            .process(&mut source, &mut sink, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, LumastaticError::EmptyStream(_)), "{err}");
        assert_eq!(session.state(), PipelineState::Failed);
        assert!(source.is_closed());
        assert_eq!(sink.lifecycle_calls(), (1, 1));
    }
}

#[test]
fn sink_failure_still_ends_sink_and_closes_source() {
    for overlap in [false, true] {
        let mut session = EffectSession::new(seeded_cfg(overlap)).unwrap();
        let mut source = InMemorySource::new(descriptor(10), alternating(10)).unwrap();
        let mut sink = InMemorySink::failing_at(3);
        let err = session
            .process(&mut source, &mut sink, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, LumastaticError::Write(_)), "{err}");
        assert!(err.to_string().contains("rejected frame 3"), "{err}");
        assert_eq!(session.state(), PipelineState::Failed);
        assert!(source.is_closed());
        assert_eq!(sink.lifecycle_calls(), (1, 1));
        assert_eq!(sink.frames().len(), 3);
    }
}

#[test]
fn decoder_failure_is_reported_as_open_error() {
    for overlap in [false, true] {
        let mut session = EffectSession::new(seeded_cfg(overlap)).unwrap();
        let mut source = BrokenSource {
            descriptor: descriptor(5),
            ok_frames: 2,
            closed: false,
        };
        let mut sink = InMemorySink::new();
        let err = session
            .process(&mut source, &mut sink, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, LumastaticError::Open(_)), "{err}");
        assert!(source.closed);
        assert_eq!(sink.lifecycle_calls(), (1, 1));
    }
}

#[test]
fn wrong_advertised_count_does_not_fail_the_run() {
    let mut session = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(25), alternating(10)).unwrap();
    let mut sink = InMemorySink::new();
    let stats = session
        .process(&mut source, &mut sink, &mut NoProgress)
        .unwrap();
    assert_eq!(stats.frames_read, 10);
    assert_eq!(stats.frames_written, 10);
    assert_eq!(stats.frames_estimated, 25);
}

#[test]
fn progress_sees_every_frame() {
    let mut session = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(6), alternating(6)).unwrap();
    let mut sink = InMemorySink::new();
    let mut rec = Recorder::default();
    session.process(&mut source, &mut sink, &mut rec).unwrap();
    assert_eq!(rec.started, Some(6));
    assert_eq!(rec.frames.len(), 6);
    assert_eq!(rec.frames[5].frames_composited, 6);
    let fin = rec.finished.unwrap();
    assert_eq!(fin.frames_read, 6);
    assert_eq!(fin.frames_written, 6);
}

#[test]
fn preview_matches_the_same_frame_of_a_full_run() {
    let mut full = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(6), alternating(6)).unwrap();
    let mut sink = InMemorySink::new();
    full.process(&mut source, &mut sink, &mut NoProgress)
        .unwrap();

    let mut preview = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(6), alternating(6)).unwrap();
    let frame = preview.preview_frame(&mut source, 3).unwrap();
    assert!(source.is_closed());
    assert_eq!(frame, sink.frames()[3].1);
}

#[test]
fn preview_past_the_end_is_rejected() {
    let mut session = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(2), alternating(2)).unwrap();
    let err = session.preview_frame(&mut source, 5).unwrap_err();
    assert!(matches!(err, LumastaticError::Validation(_)), "{err}");
}

#[test]
fn session_can_run_again_after_a_failure() {
    let mut session = EffectSession::new(seeded_cfg(false)).unwrap();
    let mut source = InMemorySource::new(descriptor(0), Vec::new()).unwrap();
    let mut sink = InMemorySink::new();
    assert!(session
        .process(&mut source, &mut sink, &mut NoProgress)
        .is_err());

    let mut source = InMemorySource::new(descriptor(2), alternating(2)).unwrap();
    let mut sink = InMemorySink::new();
    session
        .process(&mut source, &mut sink, &mut NoProgress)
        .unwrap();
    assert_eq!(session.state(), PipelineState::Done);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let cfg = EffectConfig {
        channel_capacity: 0,
        ..EffectConfig::default()
    };
    assert!(EffectSession::new(cfg).is_err());
}

#[test]
fn render_file_refuses_to_overwrite_its_input() {
    let mut session = EffectSession::new(EffectConfig::default()).unwrap();
    let p = Path::new("clip.mp4");
    let err = session.render_file(p, p, &mut NoProgress).unwrap_err();
    assert!(matches!(err, LumastaticError::Validation(_)));
    assert_eq!(session.state(), PipelineState::Failed);
}

#[test]
fn render_file_reports_missing_input_as_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = EffectSession::new(EffectConfig::default()).unwrap();
    let err = session
        .render_file(
            &dir.path().join("missing.mp4"),
            &dir.path().join("out.avi"),
            &mut NoProgress,
        )
        .unwrap_err();
    assert!(matches!(err, LumastaticError::Open(_)), "{err}");
    assert!(!dir.path().join("out.avi").exists());
}

#[test]
fn render_file_sees_through_dotted_spellings_of_the_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.mp4");
    std::fs::write(&input, b"original").unwrap();
    let spelled_differently = dir.path().join(".").join("sub").join("..").join("clip.mp4");
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let mut session = EffectSession::new(EffectConfig::default()).unwrap();
    let err = session
        .render_file(&input, &spelled_differently, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, LumastaticError::Validation(_)), "{err}");
    assert_eq!(std::fs::read(&input).unwrap(), b"original");
}

#[test]
fn render_file_rejects_output_without_extension_before_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = EffectSession::new(EffectConfig::default()).unwrap();
    let err = session
        .render_file(
            &dir.path().join("missing.mp4"),
            &dir.path().join("out"),
            &mut NoProgress,
        )
        .unwrap_err();
    assert!(matches!(err, LumastaticError::Validation(_)), "{err}");
    assert_eq!(session.state(), PipelineState::Failed);
}

#[test]
fn same_file_resolves_paths_that_do_not_exist_yet() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("new.avi");
    let b = dir.path().join(".").join("new.avi");
    assert!(same_file(&a, &b));
    assert!(!same_file(&a, &dir.path().join("other.avi")));
}
