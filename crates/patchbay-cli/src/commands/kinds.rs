//! Node kind listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings intentionally

use clap::Args;
use patchbay_core::{KindCategory, KindDescriptor, ProcessorRegistry};

#[derive(Args)]
pub struct KindsArgs {
    /// Show details for a specific kind
    #[arg(value_name = "KIND")]
    kind: Option<String>,
}

pub fn run(args: KindsArgs) -> anyhow::Result<()> {
    let registry = ProcessorRegistry::new();

    if let Some(kind) = &args.kind {
        let descriptor = registry
            .descriptor(kind)
            .ok_or_else(|| anyhow::anyhow!("Unknown kind: {}", kind))?;
        print_details(descriptor);
        return Ok(());
    }

    println!("Available Kinds");
    println!("===============");

    for category in [
        KindCategory::Source,
        KindCategory::Math,
        KindCategory::Routing,
        KindCategory::Analysis,
    ] {
        let kinds: Vec<_> = registry.kinds_in_category(category).collect();
        if kinds.is_empty() {
            continue;
        }
        println!();
        println!("{}:", category.name());
        for descriptor in kinds {
            println!("  {:12}  {}", descriptor.id, descriptor.description);
        }
    }

    println!();
    println!("Use 'patchbay kinds <KIND>' for parameters.");
    Ok(())
}

fn print_details(descriptor: &KindDescriptor) {
    println!("{}", descriptor.id);
    println!("{}", "=".repeat(descriptor.id.len()));
    println!();
    println!("{}", descriptor.description);
    println!();
    println!("Category: {}", descriptor.category.name());
    println!("Outputs:  {}", descriptor.outputs);
    if let Some(key) = descriptor.resource_key {
        println!("Resource: named by '{}'", key);
    }
    if descriptor.delay {
        println!("Delay:    feedback may pass through this kind");
    }
    println!();

    if descriptor.params.is_empty() {
        println!("No parameters.");
        return;
    }
    println!("Parameters:");
    println!();
    println!("  {:12}  {:14}  {}", "Name", "Type", "Notes");
    println!("  {:12}  {:14}  {}", "----", "----", "-----");
    for param in descriptor.params {
        let notes = if param.channel { "channel index" } else { "" };
        println!("  {:12}  {:14}  {}", param.name, param.kind.name(), notes);
    }
}
