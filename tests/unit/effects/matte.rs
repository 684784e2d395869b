use super::*;
use crate::noise::generator::{NoiseDepth, NoiseGenerator};

fn fields(w: u32, h: u32) -> (NoiseField, NoiseField) {
    let mut g = NoiseGenerator::seeded(11, NoiseDepth::Bits8);
    (g.generate(w, h).unwrap(), g.generate(w, h).unwrap())
}

fn gray_frame(w: u32, h: u32, values: &[u8]) -> Frame {
    let data = values.iter().flat_map(|&v| [v, v, v]).collect();
    Frame::from_rgb(w, h, data).unwrap()
}

#[test]
fn dark_frame_yields_static_field() {
    let (s, d) = fields(4, 4);
    let out = MatteCompositor::default()
        .composite(&Frame::solid(4, 4, [0, 0, 0]), &s, &d)
        .unwrap();
    assert_eq!(out, s);
}

#[test]
fn bright_frame_yields_dynamic_field() {
    let (s, d) = fields(4, 4);
    let out = MatteCompositor::default()
        .composite(&Frame::solid(4, 4, [255, 255, 255]), &s, &d)
        .unwrap();
    assert_eq!(out, d);
}

#[test]
fn threshold_is_strictly_greater_than() {
    let (s, d) = fields(3, 1);
    let frame = gray_frame(3, 1, &[126, 127, 128]);
    let out = MatteCompositor::default().composite(&frame, &s, &d).unwrap();
    assert_eq!(out.data, vec![s.data[0], s.data[1], d.data[2]]);
}

#[test]
fn threshold_255_is_all_background() {
    let (s, d) = fields(2, 2);
    let c = MatteCompositor::new(255, LumaMode::Rec601);
    let out = c.composite(&Frame::solid(2, 2, [255, 255, 255]), &s, &d).unwrap();
    assert_eq!(out, s);
}

#[test]
fn mixed_frame_selects_per_pixel() {
    let (w, h) = (4u32, 2u32);
    let (s, d) = fields(w, h);
    let lumas = [0u8, 255, 10, 200, 128, 127, 90, 240];
    let frame = gray_frame(w, h, &lumas);
    let out = MatteCompositor::default().composite(&frame, &s, &d).unwrap();
    for (i, &l) in lumas.iter().enumerate() {
        let expected = if l > 127 { d.data[i] } else { s.data[i] };
        assert_eq!(out.data[i], expected, "pixel {i}");
    }
}

#[test]
fn fused_path_matches_matte_then_select() {
    let (w, h) = (7u32, 5u32);
    let (s, d) = fields(w, h);
    let mut g = NoiseGenerator::seeded(99, NoiseDepth::Bits8);
    let rgb = g.generate(w * 3, h).unwrap();
    let frame = Frame::from_rgb(w, h, rgb.data).unwrap();

    for mode in [LumaMode::Rec601, LumaMode::Average] {
        let c = MatteCompositor::new(127, mode);
        let fused = c.composite(&frame, &s, &d).unwrap();
        let matte = c.derive_matte(&frame);
        let staged = apply_matte(&matte, &s, &d).unwrap();
        assert_eq!(fused, staged);
    }
}

#[test]
fn parallel_rows_match_sequential() {
    let (w, h) = (33u32, 17u32);
    let (s, d) = fields(w, h);
    let mut g = NoiseGenerator::seeded(5, NoiseDepth::Bits8);
    let frame = Frame::from_rgb(w, h, g.generate(w * 3, h).unwrap().data).unwrap();

    let seq = MatteCompositor::default();
    let par = seq.with_parallel(true);
    assert_eq!(
        seq.composite(&frame, &s, &d).unwrap(),
        par.composite(&frame, &s, &d).unwrap()
    );
}

#[test]
fn matte_counts_foreground() {
    let frame = gray_frame(2, 2, &[0, 200, 255, 127]);
    let matte = MatteCompositor::default().derive_matte(&frame);
    assert_eq!(matte.foreground_count(), 2);
    assert_eq!(matte.is_foreground(1, 0), Some(true));
    assert_eq!(matte.is_foreground(1, 1), Some(false));
    assert_eq!(matte.is_foreground(2, 0), None);
}

#[test]
fn mismatched_field_is_rejected() {
    let (s, _) = fields(4, 4);
    let (_, d) = fields(4, 2);
    let err = MatteCompositor::default()
        .composite(&Frame::solid(4, 4, [0, 0, 0]), &s, &d)
        .unwrap_err();
    assert!(err.to_string().contains("dynamic noise field"));
}

#[test]
fn short_frame_buffer_is_rejected() {
    let (s, d) = fields(2, 2);
    let frame = Frame {
        width: 2,
        height: 2,
        data: vec![0u8; 5],
    };
    assert!(MatteCompositor::default().composite(&frame, &s, &d).is_err());
}
