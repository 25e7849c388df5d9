//! Offline render command.

use super::common::{load_config, parse_resource, read_batch, register_resources};
use anyhow::Context;
use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use indicatif::{ProgressBar, ProgressStyle};
use patchbay_core::{Engine, Event, MAX_CHANNELS};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args)]
pub struct RenderArgs {
    /// Instruction batch (JSON)
    #[arg(value_name = "BATCH")]
    batch: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Engine config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resource to register before the batch (e.g., "kick=kick.wav")
    #[arg(short, long = "resource", value_parser = parse_resource, number_of_values = 1)]
    resources: Vec<(String, PathBuf)>,

    /// Seconds of audio to render
    #[arg(short, long, default_value = "1.0")]
    seconds: f64,

    /// Output channels (defaults to the config's max_channels)
    #[arg(long)]
    channels: Option<usize>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    if !(args.seconds.is_finite() && args.seconds >= 0.0) {
        anyhow::bail!("--seconds must be a non-negative number, got {}", args.seconds);
    }
    let channels = args.channels.unwrap_or(config.max_channels);
    if channels == 0 || channels > MAX_CHANNELS {
        anyhow::bail!("--channels must be between 1 and {MAX_CHANNELS}, got {channels}");
    }

    let mut engine = Engine::new(config.clone())?;
    register_resources(&mut engine, &args.resources)?;

    let batch = read_batch(&args.batch)?;
    let status = engine.apply_instructions_json(&batch);
    if status != 0 {
        anyhow::bail!("batch {} failed with status {status}", args.batch.display());
    }
    info!(
        "graph generation {}: {} nodes evaluated",
        engine.live_generation(),
        engine.live_snapshot().len()
    );

    let total = (args.seconds * config.sample_rate).round() as usize;
    let (interleaved, events) = render_offline(&engine, channels, total, config.block_size);

    write_float_wav(&args.output, channels, config.sample_rate, &interleaved)?;
    info!(
        "wrote {} frames x {} channels to {}",
        total,
        channels,
        args.output.display()
    );

    if engine.dropped_events() > 0 {
        tracing::warn!("{} events dropped", engine.dropped_events());
    }
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

/// Writes interleaved samples as a 32-bit float WAV file.
pub(super) fn write_float_wav(
    path: &Path,
    channels: usize,
    sample_rate: f64,
    interleaved: &[f32],
) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: u16::try_from(channels)?,
        sample_rate: sample_rate.round() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &sample in interleaved {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Renders `total` frames in blocks, returning interleaved samples and every
/// event drained along the way.
pub(super) fn render_offline(
    engine: &Engine,
    channels: usize,
    total: usize,
    block_size: usize,
) -> (Vec<f32>, Vec<Event>) {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    let mut interleaved = Vec::with_capacity(total * channels);
    let mut planar = vec![0.0f32; channels * block_size];
    let mut events = Vec::new();
    let mut done = 0;

    while done < total {
        let frames = (total - done).min(block_size);
        let block = &mut planar[..channels * frames];
        engine.process_planar(block, channels, frames);
        for frame in 0..frames {
            for channel in 0..channels {
                interleaved.push(block[channel * frames + frame]);
            }
        }
        events.extend(engine.drain_events());
        done += frames;
        pb.set_position(done as u64);
    }

    pb.finish_with_message("done");
    (interleaved, events)
}
