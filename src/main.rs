mod calc;
mod config;
mod db;
mod ipc;
mod model;
mod remote;
mod store;
mod telemetry;

use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

fn main() {
    let config = match config::AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("gradebookd: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = telemetry::init(&config.log_filter) {
        eprintln!("gradebookd: {e}");
        std::process::exit(2);
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        remote = ?config.remote_averages.as_ref().map(|r| r.base_url.as_str()),
        "gradebookd starting"
    );

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        config,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, exiting");
}
