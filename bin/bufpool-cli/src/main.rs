// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # bufpool
//!
//! Command-line interface for the decoder buffer pool.
//!
//! ## Usage
//! ```bash
//! # Show the pool policy and budgets for common streams
//! bufpool inspect --config ./bufpool.toml
//!
//! # Run a synthetic playback session with three threads
//! bufpool simulate --frames 5000 --seed 7 -v
//!
//! # Replay an allocation trace
//! bufpool replay ./session.trace
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bufpool",
    about = "Inspect and exercise the decoder buffer pool",
    version,
    author
)]
struct Cli {
    /// Path to a TOML pool configuration (defaults to the built-in policy).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the pool policy and the budget for common video streams.
    Inspect,

    /// Run a synthetic playback workload against the pool.
    Simulate {
        /// Number of decoded frames.
        #[arg(short, long, default_value_t = 2000)]
        frames: usize,

        /// Seed for the workload generator.
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Maximum number of video frames held by the decoder at once.
        #[arg(long, default_value_t = 16)]
        depth: usize,

        /// Print statistics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replay an allocation trace file.
    Replay {
        /// Path to the trace.
        trace: PathBuf,

        /// Print statistics as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect => commands::inspect::execute(config).await,
        Commands::Simulate {
            frames,
            seed,
            depth,
            json,
        } => commands::simulate::execute(config, frames, seed, depth, json).await,
        Commands::Replay { trace, json } => commands::replay::execute(config, trace, json).await,
    }
}
