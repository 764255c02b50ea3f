//! `modstore`: build a store from a JSON layout, inspect it, or run a script
//! of commits and dispatches against it.

mod catalog;
mod script;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use modstore::{ModuleSpec, Severity, Store, StoreConfig};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::script::Outcome;

#[derive(Parser)]
#[command(name = "modstore")]
#[command(about = "Build and exercise a module store from a JSON layout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show namespaces and registered types
    Inspect {
        #[arg(long)]
        layout: PathBuf,
    },

    /// Run a script of steps against the store
    Run {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long)]
        script: PathBuf,
        /// Keep going after a failed step
        #[arg(long)]
        keep_going: bool,
    },
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,modstore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = StoreConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Inspect { layout } => cmd_inspect(&layout, config),
        Commands::Run {
            layout,
            script,
            keep_going,
        } => cmd_run(&layout, &script, keep_going, config).await,
    }
}

fn build_store(layout: &Path, config: StoreConfig) -> Result<Store> {
    let raw = std::fs::read_to_string(layout)
        .with_context(|| format!("Failed to read layout {}", layout.display()))?;
    let root = ModuleSpec::from_layout_str(&raw)
        .with_context(|| format!("Invalid layout {}", layout.display()))?;

    tracing::info!(layout = %layout.display(), strict = config.strict, "building store");
    Ok(Store::builder(root)
        .config(config)
        .catalog(catalog::builtin())
        .build())
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_inspect(layout: &Path, config: StoreConfig) -> Result<()> {
    let store = build_store(layout, config)?;
    let types = store.registered_types();

    print_section("Namespaces", &types.namespaces);
    print_section("Mutations", &types.mutations);
    print_section("Actions", &types.actions);
    print_section("Getters", &types.getters);
    print_problems(&store);
    Ok(())
}

async fn cmd_run(layout: &Path, script: &Path, keep_going: bool, config: StoreConfig) -> Result<()> {
    let store = build_store(layout, config)?;
    let steps = script::load(script)?;
    let total = steps.len();

    for (index, step) in steps.into_iter().enumerate() {
        let label = format!("[{}/{}] {}", index + 1, total, step.describe());
        match script::execute(&store, step).await {
            Ok(Outcome::Done) => println!("{} {}", "✓".bright_green(), label),
            Ok(Outcome::Removed(true)) => println!("{} {}", "✓".bright_green(), label),
            Ok(Outcome::Removed(false)) => {
                println!("{} {} {}", "•".bright_yellow(), label, "(nothing removed)".dimmed())
            }
            Ok(Outcome::Value(value)) => {
                println!("{} {}", "✓".bright_green(), label);
                println!("{}", render(&value));
            }
            Err(err) => {
                println!("{} {}: {:#}", "✗".bright_red(), label, err);
                if !keep_going {
                    print_problems(&store);
                    return Err(err);
                }
            }
        }
    }

    print_problems(&store);
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_section(title: &str, names: &[String]) {
    println!("{} ({})", title.bright_cyan().bold(), names.len());
    for name in names {
        println!("  {name}");
    }
}

fn print_problems(store: &Store) {
    let diagnostics = store.diagnostics();
    if diagnostics.is_empty() {
        return;
    }

    println!(
        "{} ({} reported)",
        "Problems".bright_yellow().bold(),
        diagnostics.total_reported()
    );
    for entry in diagnostics.entries() {
        let label = match entry.severity {
            Severity::Warning => "warn ".yellow(),
            Severity::Error => "error".red(),
        };
        println!("  {} {}", label, entry.error);
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
