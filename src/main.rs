mod chart;
mod compare;
mod config;
mod crypto;
mod db;
mod diff;
mod ipc;
mod logging;
mod notify;
mod portal;
mod scrape;
mod snapshot;
mod store;
mod subjects;
mod value;

use std::io::{self, BufRead, Write};

fn main() {
    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("marksyncd: invalid configuration: {:#}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init_logging(&config.log_level, config.log_dir.as_deref()) {
        eprintln!("marksyncd: logging disabled: {}", e);
    }
    log::info!(
        "event=sidecar_start portal_url={} smtp={} encryption_key={}",
        config.portal_url,
        config.smtp.is_some(),
        config.encryption_key.is_some()
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
                // Can't reply without id; report and move on.
                log::warn!("event=bad_request_json error={}", e);
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        log::debug!("event=request id={} method={}", req.id, req.method);
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    log::info!("event=sidecar_stop");
}
