//! Batch validation command.

use super::common::{load_config, parse_resource, read_batch, register_resources};
use clap::Args;
use patchbay_core::{Engine, parse_batch_json};
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Instruction batch (JSON)
    #[arg(value_name = "BATCH")]
    batch: PathBuf,

    /// Engine config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resource to register before the batch (e.g., "kick=kick.wav")
    #[arg(short, long = "resource", value_parser = parse_resource, number_of_values = 1)]
    resources: Vec<(String, PathBuf)>,

    /// Print every parsed instruction
    #[arg(short, long)]
    verbose: bool,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let text = read_batch(&args.batch)?;

    let instructions = match parse_batch_json(&text) {
        Ok(instructions) => instructions,
        Err(err) => {
            println!("status -1");
            anyhow::bail!("{} does not parse: {err}", args.batch.display());
        }
    };
    if args.verbose {
        for (i, instruction) in instructions.iter().enumerate() {
            println!("  {:>4}  {}", i + 1, instruction);
        }
    }

    let mut engine = Engine::new(config)?;
    register_resources(&mut engine, &args.resources)?;

    match engine.apply(&instructions) {
        Ok(report) => {
            println!("status 0");
            println!(
                "{} instructions applied, {} nodes pending, live generation {}",
                report.applied,
                engine.pending_graph().len(),
                engine.live_generation()
            );
            if !report.assigned.is_empty() {
                let ids: Vec<String> = report.assigned.iter().map(ToString::to_string).collect();
                println!("assigned ids: {}", ids.join(", "));
            }
            Ok(())
        }
        Err(err) => {
            println!("status {}", err.status());
            Err(err.into())
        }
    }
}
