mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tex_unpacker_core::TextureContainer;
use tex_unpacker_core::prelude::*;

/// Two plain frames in a 16x8 CCZ texture.
fn small_atlas(dir: &Path, extra: &[SpriteSpec]) -> (PathBuf, SyntheticAtlas) {
    let mut rng = StdRng::seed_from_u64(21);
    let specs = vec![SpriteSpec::plain("a.png", 0, 0, 8, 8), SpriteSpec::plain("b.png", 8, 0, 8, 8)];
    let fixture = synthetic_atlas(&mut rng, 16, 8, &specs);
    let mut all = specs;
    all.extend_from_slice(extra);
    write(&dir.join("atlas.pvr.ccz"), ccz_zlib(&pvr_rgba(&fixture.atlas)));
    let plist = dir.join("atlas.plist");
    write(&plist, modern_plist("atlas.pvr.ccz", (16, 8), &all));
    (plist, fixture)
}

#[test]
fn probe_counts_frames_and_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (plist, _) = small_atlas(dir.path(), &[]);
    let before = list_files(dir.path());

    let report = probe(&plist, None).expect("probe");
    assert_eq!(report.frame_count, 2);
    assert_eq!(report.frame_names, ["a.png", "b.png"]);
    assert_eq!(report.texture_path, Some(dir.path().join("atlas.pvr.ccz")));
    assert_eq!(report.format_version, Some(2));
    let tex = report.texture.expect("texture metadata");
    assert_eq!((tex.width, tex.height), (16, 8));
    assert_eq!(tex.pixel_format, "RGBA8888");
    assert_eq!(tex.container, TextureContainer::PvrCcz);

    assert_eq!(list_files(dir.path()), before);
    assert!(!dir.path().join("unpacked").exists());
}

#[test]
fn probe_without_texture_reports_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plist = dir.path().join("lonely.plist");
    write(&plist, modern_plist("lonely.png", (8, 8), &[SpriteSpec::plain("x.png", 0, 0, 8, 8)]));
    let report = probe(&plist, None).expect("probe");
    assert_eq!(report.texture_path, None);
    assert!(report.texture.is_none());
    assert_eq!(report.frame_count, 1);

    let json = tex_unpacker_core::probe_to_json(&report);
    assert!(json["texture"].is_null());
}

#[test]
fn skip_existing_second_run_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (plist, _) = small_atlas(dir.path(), &[]);
    let opts = ExtractOptions::builder().skip_existing(true).build();

    let first = extract(&plist, &opts, |_| {}).expect("first run");
    assert_eq!(first.written(), 2);

    let out = dir.path().join("unpacked/a.png");
    std::fs::write(&out, b"sentinel").expect("overwrite");
    let second = extract(&plist, &opts, |_| {}).expect("second run");
    assert_eq!(second.written(), 0);
    assert_eq!(second.skipped(), 2);
    assert!(second.frames.iter().all(|f| f.status == FrameStatus::Skipped));
    assert_eq!(std::fs::read(&out).expect("read"), b"sentinel");
}

#[test]
fn bad_frames_are_recorded_and_others_still_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let extra = [
        SpriteSpec::plain("outside.png", 12, 4, 8, 8),
        SpriteSpec::plain("../escape.png", 0, 0, 2, 2),
    ];
    let (plist, _) = small_atlas(dir.path(), &extra);

    let summary = extract(&plist, &ExtractOptions::default(), |_| {}).expect("extract");
    assert_eq!(summary.written(), 2);
    assert_eq!(summary.failed(), 2);
    let failed: Vec<&str> = summary.failures().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, ["outside.png", "../escape.png"]);
    assert!(summary.frames[3].path.is_none());
    assert!(!dir.path().join("escape.png").exists());
    match &summary.frames[2].status {
        FrameStatus::Failed { reason } => assert!(reason.contains("outside"), "{reason}"),
        other => panic!("unexpected status {other:?}"),
    }
}

#[test]
fn fail_fast_stops_at_first_bad_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (plist, _) = small_atlas(dir.path(), &[SpriteSpec::plain("outside.png", 12, 4, 8, 8)]);
    let opts = ExtractOptions::builder().fail_fast(true).build();
    let err = extract(&plist, &opts, |_| {}).expect_err("fail fast");
    assert!(matches!(err, UnpackError::Reconstruction { ref frame, .. } if frame == "outside.png"));
}

#[test]
fn cancel_flag_stops_between_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (plist, _) = small_atlas(dir.path(), &[]);
    let flag = Arc::new(AtomicBool::new(false));
    let opts = ExtractOptions::builder().cancel_flag(flag.clone()).build();

    let summary = extract(&plist, &opts, |p| {
        if p.index == 0 {
            flag.store(true, Ordering::Relaxed);
        }
    })
    .expect("extract");
    assert!(summary.cancelled);
    assert_eq!(summary.frames.len(), 1);
    assert!(!dir.path().join("unpacked/b.png").exists());
}

#[test]
fn texture_override_wins_over_descriptor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (plist, fixture) = small_atlas(dir.path(), &[]);
    let other = dir.path().join("elsewhere/replacement.png");
    std::fs::create_dir_all(other.parent().unwrap()).unwrap();
    fixture.atlas.save(&other).expect("save");

    let opts = ExtractOptions::builder().texture(&other).format(OutputFormat::Bmp).build();
    let summary = extract(&plist, &opts, |_| {}).expect("extract");
    assert_eq!(summary.texture_path, other);
    assert!(dir.path().join("unpacked/a.bmp").exists());

    let missing = ExtractOptions::builder().texture(dir.path().join("nope.png")).build();
    assert!(matches!(extract(&plist, &missing, |_| {}), Err(UnpackError::Io { .. })));
}

#[test]
fn compressed_texture_without_tool_is_an_explicit_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(&dir.path().join("gpu.pvr"), pvr_v3_compressed(2, 8, 8));
    let plist = dir.path().join("gpu.plist");
    write(&plist, modern_plist("gpu.pvr", (8, 8), &[SpriteSpec::plain("x.png", 0, 0, 8, 8)]));

    // probe only reads the header
    let report = probe(&plist, None).expect("probe");
    assert_eq!(report.texture.expect("meta").pixel_format, "PVRTC 4bpp");

    if std::env::var_os("PVRTEXTOOL").is_none() {
        let err = extract(&plist, &ExtractOptions::default(), |_| {}).expect_err("no converter");
        assert!(matches!(err, UnpackError::Compressed { ref format, .. } if format == "PVRTC 4bpp"));
        assert_eq!(err.path(), Some(dir.path().join("gpu.pvr").as_path()));
    }

    let opts = ExtractOptions::builder().pvrtextool("").build();
    assert!(matches!(opts.validate(), Err(UnpackError::InvalidOptions(_))));

    let opts = ExtractOptions::builder()
        .pvrtextool(dir.path().join("no-such-tool"))
        .build();
    let err = extract(&plist, &opts, |_| {}).expect_err("tool missing");
    assert!(matches!(err, UnpackError::ExternalTool { .. }));
}

#[cfg(unix)]
#[test]
fn compressed_texture_is_delegated_to_the_converter() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut rng = StdRng::seed_from_u64(9);
    let atlas = random_image(&mut rng, 8, 8);
    let converted = dir.path().join("converted.png");
    atlas.save(&converted).expect("save");
    let tool = dir.path().join("fake-tool");
    std::fs::write(&tool, format!("#!/bin/sh\ncp '{}' \"$4\"\n", converted.display())).unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    write(&dir.path().join("gpu.pvr.ccz"), ccz_zlib(&pvr_v3_compressed(2, 8, 8)));
    let plist = dir.path().join("gpu.plist");
    write(&plist, modern_plist("gpu.pvr.ccz", (8, 8), &[SpriteSpec::plain("x.png", 0, 0, 8, 8)]));

    let opts = ExtractOptions::builder().pvrtextool(&tool).build();
    let summary = extract(&plist, &opts, |_| {}).expect("extract");
    assert_eq!(summary.written(), 1);
    let got = image::open(dir.path().join("unpacked/x.png")).expect("open").to_rgba8();
    assert!(got == atlas);
}

#[test]
fn truncated_binary_descriptor_is_rejected_with_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plist = dir.path().join("bin.plist");
    write(&plist, b"bplist00\x00\x01");
    let err = probe(&plist, None).expect_err("truncated binary plist");
    assert!(matches!(err, UnpackError::Descriptor { .. }));
    assert_eq!(err.path(), Some(plist.as_path()));
}
