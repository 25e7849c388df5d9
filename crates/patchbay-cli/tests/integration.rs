//! Integration tests for patchbay-cli.
//!
//! Tests cover the CLI binary invocation: kind listing, batch checking, and
//! end-to-end offline rendering with file-backed resources.

use std::path::Path;
use std::process::Command;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tempfile::TempDir;

/// Helper to get the path to the `patchbay` binary built by cargo.
fn patchbay_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_patchbay"))
}

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn write_mono_wav(path: &Path, samples: &[f32]) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

// ---------------------------------------------------------------------------
// `patchbay kinds`
// ---------------------------------------------------------------------------

#[test]
fn cli_kinds_lists_builtins() {
    let output = patchbay_bin()
        .arg("kinds")
        .output()
        .expect("failed to run patchbay kinds");
    assert!(output.status.success(), "patchbay kinds failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available Kinds"));
    for kind in [
        "root", "const", "in", "add", "mul", "phasor", "sin", "sample", "meter", "delay1b",
        "passthrough",
    ] {
        assert!(stdout.contains(kind), "kind listing should contain '{kind}'");
    }
}

#[test]
fn cli_kinds_detail_shows_parameters() {
    let output = patchbay_bin()
        .args(["kinds", "sample"])
        .output()
        .expect("failed to run patchbay kinds sample");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Parameters"));
    assert!(stdout.contains("path"));
    assert!(stdout.contains("loop"));
    assert!(stdout.contains("channel index"));
}

#[test]
fn cli_kinds_unknown_fails() {
    let output = patchbay_bin()
        .args(["kinds", "reverb"])
        .output()
        .expect("failed to run patchbay kinds reverb");
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `patchbay check`
// ---------------------------------------------------------------------------

#[test]
fn cli_check_reports_success() {
    let dir = TempDir::new().unwrap();
    let batch = write_file(
        dir.path(),
        "ok.json",
        r#"[[0, 1, "const"], [0, null, "phasor"], [0, 2, "root"], [2, 2, 1], [4, [2]]]"#,
    );
    let output = patchbay_bin()
        .args(["check", "--verbose"])
        .arg(&batch)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("status 0"), "stdout: {stdout}");
    assert!(stdout.contains("live generation 1"));
    assert!(stdout.contains("assigned ids"));
}

#[test]
fn cli_check_reports_failing_index() {
    let dir = TempDir::new().unwrap();
    let batch = write_file(
        dir.path(),
        "bad.json",
        r#"[[0, 1, "const"], [2, 1, 99], [0, 3, "const"]]"#,
    );
    let output = patchbay_bin().arg("check").arg(&batch).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("status 2"));
}

#[test]
fn cli_check_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    let batch = write_file(dir.path(), "garbage.json", r#"[[0, 1]]"#);
    let output = patchbay_bin().arg("check").arg(&batch).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("status -1"));
}

// ---------------------------------------------------------------------------
// `patchbay render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_writes_float_wav_and_events() {
    let dir = TempDir::new().unwrap();
    let batch = write_file(
        dir.path(),
        "graph.json",
        r#"[[0, 1, "const"], [3, 1, "value", 0.25],
            [0, 2, "meter"], [3, 2, "name", "level"], [2, 2, 1],
            [0, 3, "root"], [3, 3, "channel", 1], [2, 3, 2], [4, [3]]]"#,
    );
    let config = write_file(dir.path(), "engine.toml", "sample_rate = 1000.0\nblock_size = 100\n");
    let out = dir.path().join("out.wav");

    let output = patchbay_bin()
        .arg("render")
        .arg(&batch)
        .arg(&out)
        .arg("--config")
        .arg(&config)
        .args(["--seconds", "0.5"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let mut reader = WavReader::open(&out).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 1000);
    assert_eq!(spec.sample_format, SampleFormat::Float);
    let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 1000);
    for frame in samples.chunks(2) {
        assert_eq!(frame, [0.0, 0.25]);
    }

    // 500 frames in blocks of 100: five meter events.
    let events: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0]["type"], "meter");
    assert_eq!(events[0]["event"]["source"], "level");
}

#[test]
fn cli_render_plays_resource() {
    let dir = TempDir::new().unwrap();
    let wav = dir.path().join("ramp.wav");
    write_mono_wav(&wav, &[0.1, 0.2, 0.3, 0.4]);
    let batch = write_file(
        dir.path(),
        "graph.json",
        r#"[[0, 1, "sample"], [3, 1, "path", "ramp"], [3, 1, "loop", true], [4, [1]]]"#,
    );
    let config = write_file(dir.path(), "engine.toml", "sample_rate = 8.0\nmax_channels = 1\n");
    let out = dir.path().join("out.wav");

    let output = patchbay_bin()
        .arg("render")
        .arg(&batch)
        .arg(&out)
        .arg("--config")
        .arg(&config)
        .arg("--resource")
        .arg(format!("ramp={}", wav.display()))
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let mut reader = WavReader::open(&out).unwrap();
    let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
    assert_eq!(samples, vec![0.1, 0.2, 0.3, 0.4, 0.1, 0.2, 0.3, 0.4]);
}

#[test]
fn cli_render_rejects_failing_batch() {
    let dir = TempDir::new().unwrap();
    let batch = write_file(dir.path(), "bad.json", r#"[[4, [7]]]"#);
    let out = dir.path().join("out.wav");
    let output = patchbay_bin()
        .arg("render")
        .arg(&batch)
        .arg(&out)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!out.exists());
}

// ---------------------------------------------------------------------------
// `patchbay tone`
// ---------------------------------------------------------------------------

#[test]
fn cli_tone_writes_sine() {
    let dir = TempDir::new().unwrap();
    let config = write_file(dir.path(), "engine.toml", "sample_rate = 400.0\nblock_size = 16\n");
    let out = dir.path().join("tone.wav");

    let output = patchbay_bin()
        .arg("tone")
        .arg(&out)
        .arg("--config")
        .arg(&config)
        .args(["--freq", "100", "--gain", "1", "--seconds", "0.1", "--channels", "2"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "tone failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let mut reader = WavReader::open(&out).unwrap();
    assert_eq!(reader.spec().channels, 2);
    let samples: Vec<f32> = reader.samples::<f32>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 80);
    // 100 Hz at 400 Hz: 0, 1, 0, -1 on both channels.
    let expected = [0.0f32, 1.0, 0.0, -1.0];
    for (frame, pair) in samples.chunks(2).enumerate() {
        let want = expected[frame % 4];
        assert!((pair[0] - want).abs() < 1e-4, "frame {frame}: {pair:?}");
        assert_eq!(pair[0], pair[1]);
    }
}
