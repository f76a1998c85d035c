mod auth;
mod cli;
mod commands;
mod envelope;

use clap::Parser;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use cli::GlobalCli;
use envelope::Envelope;
use fppsync_core::Config;

#[tokio::main]
async fn main() {
    let cli = GlobalCli::parse();

    if let Err(err) = cli::init_tracing(cli.verbose, cli.quiet) {
        eprintln!("error: failed to initialize logging: {err:#}");
        std::process::exit(3);
    }

    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            let envelope = Envelope::from_error(&err);
            print_envelope(&envelope);
            std::process::exit(envelope.exit_code(Some(&err)));
        }
    };
    if let Err(err) = cfg.apply_overrides(&cli.set) {
        let envelope = Envelope::from_error(&err);
        print_envelope(&envelope);
        std::process::exit(envelope.exit_code(Some(&err)));
    }
    debug!(?cfg.loaded_from, "resolved config");

    let now_epoch = now_epoch();
    let (envelope, err) = commands::dispatch(&cfg, cli.command, cli.access_token, now_epoch).await;
    print_envelope(&envelope);
    std::process::exit(envelope.exit_code(err.as_ref()));
}

fn print_envelope(envelope: &Envelope) {
    match serde_json::to_string_pretty(envelope) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("error: failed to render envelope: {err}"),
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
