#![windows_subsystem = "windows"]
use std::io::{self, BufRead};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod error;
mod model;
mod parsers;
mod protocol;
mod services;

use protocol::{Outbox, Session};
use services::settings;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("COPILOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();
}

fn main() {
    init_tracing();

    let config_dir = settings::config_dir();
    let loaded = settings::load(&config_dir).unwrap_or_else(|e| {
        error!(error = %e, "failed to load settings, using defaults");
        Default::default()
    });
    info!(dir = %config_dir.display(), "copilot-core started");

    let out: Outbox = Arc::new(Mutex::new(io::stdout()));
    let mut session = Session::new(loaded, config_dir, Arc::clone(&out));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };

        if line.trim().is_empty() {
            continue;
        }

        let result = catch_unwind(AssertUnwindSafe(|| session.handle(&line)));

        let response = match result {
            Ok(resp) => resp,
            Err(_) => {
                error!("request handler panicked");
                serde_json::json!({
                    "status": "error",
                    "message": "internal core error"
                })
                .to_string()
            }
        };

        protocol::emit(&out, &response);
    }

    if let Some(summary) = session.shutdown() {
        info!(
            translated = summary.translated,
            failed = summary.failed,
            "batch stopped on exit"
        );
    }
}
