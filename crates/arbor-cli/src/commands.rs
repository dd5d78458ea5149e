use arbor_sdk::{common_ancestor, MergeConfig, MergeOutcome, Version};
use colored::Colorize;
use serde_json::json;

use crate::cli::*;
use crate::render::{changes_text, tree_json, tree_text, version_json};
use crate::scenario::Scenario;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Merge(args) => cmd_merge(args, cli.format, cli.verbose),
        Command::Show(args) => cmd_show(args, cli.format),
    }
}

fn cmd_merge(args: MergeArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let config = if args.left_first {
        MergeConfig::left_first()
    } else {
        scenario.merge.clone()
    };
    let mut branches = scenario.build(config)?;
    let left = branches.left.head().clone();
    let right = branches.right.head().clone();
    let ancestor = common_ancestor(&left, &right)?;

    let outcome = branches.left.merge(&right)?;
    let result = outcome.version();
    let tree = result.tree()?;

    match format {
        OutputFormat::Json => {
            let value = json!({
                "outcome": outcome.name(),
                "left": version_json(&left),
                "right": version_json(&right),
                "ancestor": ancestor.as_ref().map(version_json),
                "result": version_json(result),
                "tree": tree_json(&tree)?,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), outcome_label(&outcome));
            print_version("left", &left);
            print_version("right", &right);
            match &ancestor {
                Some(ancestor) => print_version("ancestor", ancestor),
                None => println!("  {:<9}{}", "ancestor", "none".dimmed()),
            }
            print_version("result", result);
            if verbose {
                let base_tree = branches.base.tree()?;
                println!("\nChanges since base:");
                for change in changes_text(&tree, &base_tree)? {
                    println!("  {change}");
                }
                println!(
                    "Store: {} objects, {} cached, {} round trips",
                    branches.store.len(),
                    branches.cache.cached_len(),
                    branches.store.round_trips()
                );
            }
            println!();
            print!("{}", tree_text(&tree)?);
        }
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let branches = scenario.build(scenario.merge.clone())?;
    let replica = branches.get(args.branch);
    let tree = replica.tree()?;

    match format {
        OutputFormat::Json => {
            let value = json!({
                "branch": args.branch.name(),
                "version": version_json(replica.head()),
                "tree": tree_json(&tree)?,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("On branch {}", args.branch.name().yellow().bold());
            print_version("head", replica.head());
            println!();
            print!("{}", tree_text(&tree)?);
        }
    }
    Ok(())
}

fn outcome_label(outcome: &MergeOutcome) -> String {
    match outcome {
        MergeOutcome::Identical(_) => "Branches are identical".to_string(),
        MergeOutcome::FastForward(_) => "Fast-forward".to_string(),
        MergeOutcome::Merged(v) => format!("Merged {} operations", v.operations().len()),
    }
}

fn print_version(label: &str, version: &Version) {
    println!("  {:<9}{}", label, version.summary());
}
