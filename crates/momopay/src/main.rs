// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Momopay - MoMo SMS payment reconciliation.
//!
//! This is the binary entry point for the reconciliation service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod parse;
mod serve;
mod shutdown;
mod sweep;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use momopay_config::MomopayConfig;

/// Momopay - MoMo SMS payment reconciliation.
#[derive(Parser, Debug)]
#[command(name = "momopay", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook, admin API, worker pool, and retry sweeper.
    Serve,
    /// Run one retry sweep against the database and exit.
    Sweep,
    /// Parse an SMS body with the configured parser without storing anything.
    Parse {
        /// SMS text. Phone numbers are masked before the parser sees them.
        text: String,
        /// Prompt body to hand the parser instead of none.
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Validate configuration and print a summary.
    CheckConfig,
}

fn load(path: Option<&PathBuf>) -> MomopayConfig {
    let loaded = match path {
        Some(path) => momopay_config::load_and_validate_path(path),
        None => momopay_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            momopay_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn print_config_summary(config: &MomopayConfig) {
    let configured = |t: &Option<String>| if t.is_some() { "set" } else { "MISSING (fail-closed)" };
    println!("momopay: config ok (service.name={})", config.service.name);
    println!(
        "  listen        {}:{}",
        config.server.bind_address, config.server.port
    );
    println!("  database      {}", config.storage.database_path);
    println!("  webhook token {}", configured(&config.server.webhook_token));
    println!("  admin token   {}", configured(&config.server.admin_token));
    println!(
        "  parser        pattern{} (min confidence {})",
        if config.parser.inference.enabled {
            format!(" + inference ({})", config.parser.inference.model)
        } else {
            String::new()
        },
        config.parser.min_confidence
    );
    println!(
        "  retry         {} attempts, sweep every {}s",
        config.retry.max_attempts, config.retry.sweep_interval_secs
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Sweep) => sweep::run_sweep(config).await,
        Some(Commands::Parse { text, prompt }) => parse::run_parse(&config, &text, prompt).await,
        Some(Commands::CheckConfig) => {
            print_config_summary(&config);
            Ok(())
        }
        None => {
            println!("momopay: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
