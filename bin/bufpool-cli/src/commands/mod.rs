// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared setup.

pub mod inspect;
pub mod replay;
pub mod simulate;

use decoder_buffer::{BufferPoolConfig, BufferPoolStats};
use std::path::Path;

/// Installs the global subscriber. `RUST_LOG` wins over `-v` when set.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Loads the pool configuration, or the built-in default without a path.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BufferPoolConfig> {
    match path {
        Some(path) => {
            let config = BufferPoolConfig::from_file(path)?;
            tracing::info!(path = %path.display(), "loaded pool configuration");
            Ok(config)
        }
        None => Ok(BufferPoolConfig::default()),
    }
}

pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║{:^54}║", format!("bufpool · {title}"));
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

pub fn mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Prints statistics as an aligned table or as JSON.
pub fn print_stats(stats: &BufferPoolStats, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!("  Statistics:");
    println!("   Allocations:       {}", stats.total_allocations);
    println!(
        "   Denied:            {} ({:.1}%)",
        stats.denied_allocations,
        stats.denial_ratio() * 100.0
    );
    println!("   Frees:             {}", stats.total_frees);
    println!("   Peak allocated:    {:.2} MB", mb(stats.peak_allocated_bytes));
    println!("   Peak capacity:     {:.2} MB", mb(stats.peak_capacity_bytes));
    println!(
        "   Pools:             {} created, {} released",
        stats.pools_created, stats.pools_released
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn demo(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos").join(name)
    }

    #[test]
    fn test_load_default_config() {
        let config = load_config(None).unwrap();
        assert_eq!(config, BufferPoolConfig::default());
    }

    #[test]
    fn test_load_demo_config() {
        let config = load_config(Some(demo("bufpool.toml").as_path())).unwrap();
        assert_eq!(config.budgets.len(), 4);
        assert!(!config.allocate_on_demand);
    }

    #[tokio::test]
    async fn test_replay_demo_trace() {
        let config = load_config(Some(demo("bufpool.toml").as_path())).unwrap();
        replay::execute(config, demo("session.trace"), true).await.unwrap();
    }

    #[test]
    fn test_mb() {
        assert_eq!(mb(3 * 1024 * 1024), 3.0);
    }
}
