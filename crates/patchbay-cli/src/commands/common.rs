//! Helpers shared by the commands: config loading, resource files, batches.

use anyhow::Context;
use hound::{SampleFormat, WavReader};
use patchbay_core::{Engine, EngineConfig, MAX_CHANNELS};
use std::path::{Path, PathBuf};
use tracing::info;

/// Parses a `name=path` resource argument.
pub fn parse_resource(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!(
            "Invalid resource format: '{}' (expected name=file.wav)",
            s
        )),
    }
}

/// Loads the engine config, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Reads the batch file as text.
pub fn read_batch(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading batch {}", path.display()))
}

/// Decoded WAV contents in planar layout.
pub struct PlanarAudio {
    /// Channel count.
    pub channels: usize,
    /// Frames per channel.
    pub frames: usize,
    /// Channel regions of `frames` samples, concatenated.
    pub data: Vec<f32>,
    /// File sample rate.
    pub sample_rate: u32,
}

/// Reads a WAV file into planar f32 samples.
pub fn read_wav_planar(path: &Path) -> anyhow::Result<PlanarAudio> {
    let reader =
        WavReader::open(path).with_context(|| format!("opening WAV {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 || channels > MAX_CHANNELS {
        anyhow::bail!(
            "{} has {} channels (1 to {} supported)",
            path.display(),
            channels,
            MAX_CHANNELS
        );
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channels;
    let mut data = vec![0.0; channels * frames];
    for (frame, samples) in interleaved.chunks_exact(channels).enumerate() {
        for (channel, &sample) in samples.iter().enumerate() {
            data[channel * frames + frame] = sample;
        }
    }

    Ok(PlanarAudio {
        channels,
        frames,
        data,
        sample_rate: spec.sample_rate,
    })
}

/// Registers each `name=file.wav` resource with the engine.
pub fn register_resources(engine: &mut Engine, resources: &[(String, PathBuf)]) -> anyhow::Result<()> {
    for (name, path) in resources {
        let audio = read_wav_planar(path)?;
        let rate = engine.config().sample_rate;
        if f64::from(audio.sample_rate) != rate {
            tracing::warn!(
                "resource {name}: file is {} Hz, engine runs at {rate} Hz; playing unconverted",
                audio.sample_rate
            );
        }
        info!(
            "resource {name}: {} channels, {} frames from {}",
            audio.channels,
            audio.frames,
            path.display()
        );
        engine
            .register_resource(name.as_str(), audio.channels, audio.frames, audio.data)
            .with_context(|| format!("registering resource {name}"))?;
    }
    Ok(())
}
