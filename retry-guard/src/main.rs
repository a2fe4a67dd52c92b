//! Retry-loop guard CLI.
//!
//! Replays recorded tool-call traces (`.jsonl`) through the guard to show
//! which identical retries it would have blocked, and what the decision-maker
//! would have been told to do instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use retry_guard::core::fingerprint::fingerprint;
use retry_guard::exit_codes;
use retry_guard::io::config::{DEFAULT_CONFIG_FILE, GuardConfig, load_config, write_config};
use retry_guard::logging;
use retry_guard::replay::{render_report, replay_file};

#[derive(Parser)]
#[command(
    name = "retry-guard",
    version,
    about = "Block identical retries of failed agent tool calls"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `guard.toml` if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        /// Config path to write.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Print the fingerprint of a tool call.
    Fingerprint {
        /// Tool name.
        tool: String,
        /// Parameters as JSON (defaults to none).
        params: Option<String>,
    },
    /// Replay a JSONL trace and report calls the guard would block.
    Replay {
        /// Trace file, one event per line.
        trace: PathBuf,
        /// Config path (defaults apply if the file is missing).
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Fingerprint { tool, params } => cmd_fingerprint(&tool, params.as_deref()),
        Command::Replay {
            trace,
            config,
            json,
        } => cmd_replay(&trace, &config, json),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        return Ok(exit_codes::OK);
    }
    write_config(path, &GuardConfig::default())?;
    Ok(exit_codes::OK)
}

fn cmd_fingerprint(tool: &str, params: Option<&str>) -> Result<i32> {
    let parameters: Value = match params {
        Some(raw) => serde_json::from_str(raw).context("parse params json")?,
        None => Value::Null,
    };
    println!("{}", fingerprint(tool, &parameters));
    Ok(exit_codes::OK)
}

fn cmd_replay(trace: &Path, config_path: &Path, json: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let outcome = replay_file(trace, &config)?;
    if json {
        let mut payload = serde_json::to_string_pretty(&outcome).context("serialize report")?;
        payload.push('\n');
        print!("{}", payload);
    } else {
        print!("{}", render_report(&outcome));
    }
    if outcome.has_blocked() {
        return Ok(exit_codes::BLOCKED);
    }
    Ok(exit_codes::OK)
}
