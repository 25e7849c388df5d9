//! Test tone command: renders a sine built as a node tree.

use super::common::load_config;
use super::render::{render_offline, write_float_wav};
use clap::Args;
use patchbay_core::tree::primitives::{constant, cycle, mul2, root_on};
use patchbay_core::{Directive, Engine, MAX_CHANNELS};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ToneArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Engine config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tone frequency in Hz
    #[arg(short, long, default_value = "110.0")]
    freq: f64,

    /// Linear gain
    #[arg(short, long, default_value = "0.5")]
    gain: f64,

    /// Seconds of audio to render
    #[arg(short, long, default_value = "1.0")]
    seconds: f64,

    /// Output channels, each carrying the tone
    #[arg(long, default_value = "1")]
    channels: usize,
}

pub fn run(args: ToneArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    if !(args.seconds.is_finite() && args.seconds >= 0.0) {
        anyhow::bail!("--seconds must be a non-negative number, got {}", args.seconds);
    }
    if args.channels == 0 || args.channels > MAX_CHANNELS {
        anyhow::bail!(
            "--channels must be between 1 and {MAX_CHANNELS}, got {}",
            args.channels
        );
    }

    let voice = mul2(constant(args.gain), cycle(constant(args.freq)));
    let roots = (0..args.channels)
        .map(|channel| root_on(channel, voice.clone()))
        .collect();

    let mut engine = Engine::new(config.clone())?;
    let report = engine.render(Directive::graph(roots))?;
    info!(
        "{} Hz tone: {} instructions, {} nodes",
        args.freq,
        report.applied,
        engine.pending_graph().len()
    );

    let total = (args.seconds * config.sample_rate).round() as usize;
    let (interleaved, _) = render_offline(&engine, args.channels, total, config.block_size);
    write_float_wav(&args.output, args.channels, config.sample_rate, &interleaved)?;
    info!("wrote {} frames to {}", total, args.output.display());
    Ok(())
}
