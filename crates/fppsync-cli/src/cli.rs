//! Argument parsing and tracing bootstrap: `-v`/`-q` counts map to a
//! `RUST_LOG` default, but an explicit `RUST_LOG` always wins when set.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fppsync",
    version,
    about = "Deterministic bidirectional sync between a calendar and an FPP scheduler"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Overrides config resolution (see `fppsync_core::config::Config::load`).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Overrides a single resolved config field for this run only, as
    /// `key=value` (repeatable). Applied after the TOML file is loaded and
    /// takes precedence over it; never persisted. Accepts the same keys as
    /// the config file: `data_dir`, `schedule_path`, `local_timezone`,
    /// `latitude_deg`, `longitude_offset_minutes`, `timezone_offset_minutes`,
    /// `calendar_id`, `provider`, `sync_mode`, `fpp_writable`,
    /// `calendar_writable`, `fail_on_blocked`.
    #[arg(long = "set", global = true)]
    pub set: Vec<String>,

    /// Bearer access token for the calendar provider (preview/apply/status).
    #[arg(long = "access-token", env = "FPPSYNC_ACCESS_TOKEN", global = true)]
    pub access_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Read-only summary of the last persisted manifest and tombstones.
    Status,
    /// Manifest counts by ownership/tombstone state (no mutation).
    Diagnostics,
    /// Run the pipeline through to a `ReconciliationPlan`; never writes.
    Preview,
    /// Compute the plan and apply it to FPP and/or the calendar.
    Apply {
        /// Validate and stage writes but don't actually perform them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Persists a new `calendar_id` into the config file.
    SetCalendar { calendar_id: String },
    /// Persists a new sync mode: `both`, `calendar-to-fpp`, `fpp-to-calendar`.
    SetSyncMode { mode: String },
    /// Reports whether a cached OAuth access token is on disk.
    AuthStatus,
    /// Deletes the cached OAuth access token.
    AuthClear,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
