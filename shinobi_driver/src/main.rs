// CLI entry point for the shinobi village sim.
//
// Runs the game in real time and reads player commands from stdin, one JSON
// object per line, e.g.
//   {"command":"graduate_trainee","trainee_id":"..."}
// Malformed lines are logged and skipped. End of input (^D) saves and
// exits.
//
// Usage:
//   shinobi [OPTIONS]
//     --save <PATH>               Save file (default: shinobi_save.json)
//     --config <PATH>             JSON game config; omitted fields use defaults
//     --seed <N>                  PRNG seed (default: from the system clock)
//     --tick-ms <MS>              Frame duration of the driver loop (default: 100)
//     --save-interval-ms <MS>     Autosave interval (default: 30000)
//     -v, --verbose               Debug logging

use clap::Parser;
use log::{error, info, warn};
use shinobi_driver::driver::DriverConfig;
use shinobi_driver::{logging, save, start_driver};
use shinobi_sim::command::Command;
use shinobi_sim::config::GameConfig;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shinobi village idle game, headless.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Save file to load from and write to
    #[arg(long, default_value = "shinobi_save.json")]
    save: PathBuf,

    /// Game config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// PRNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Driver frame duration in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    /// Autosave interval in milliseconds
    #[arg(long, default_value_t = 30_000)]
    save_interval_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    let game = match &args.config {
        Some(path) => match save::load_config(path) {
            Ok(config) => config,
            Err(err) => {
                error!("could not read config {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => GameConfig::default(),
    };
    let config = DriverConfig {
        save_path: args.save,
        game,
        seed: args.seed.unwrap_or_else(clock_seed),
        frame_ms: args.tick_ms,
        save_interval_ms: args.save_interval_ms,
        ..DriverConfig::default()
    };

    let handle = match start_driver(config) {
        Ok(handle) => handle,
        Err(err) => {
            error!("failed to start: {err}");
            std::process::exit(1);
        }
    };

    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("stdin: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Command>(&line) {
            Ok(command) => {
                if !handle.send(command) {
                    break;
                }
            }
            Err(err) => warn!("ignoring malformed command: {err}"),
        }
    }

    match handle.stop() {
        Ok(summary) => info!(
            "stopped at game time {} with {} point(s), {} unit(s)",
            summary.game_time, summary.points, summary.units
        ),
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    }
}
