use crate::compare::{self, CompareReport};
use crate::ipc::error::{get_optional_bool, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::notify::{self, ContactMap, MailTransport, SmtpMailer};
use crate::snapshot::SnapshotError;
use serde_json::json;
use std::path::{Path, PathBuf};

fn snapshot_err(e: SnapshotError) -> HandlerErr {
    let code = match &e {
        SnapshotError::Decryption(_) => "decrypt_failed",
        SnapshotError::Io { .. } | SnapshotError::Format(_) => "snapshot_load_failed",
    };
    HandlerErr::new(code, e.to_string())
}

fn run(state: &AppState, params: &serde_json::Value) -> Result<CompareReport, HandlerErr> {
    let old_path = PathBuf::from(get_required_str(params, "oldPath")?);
    let new_path = PathBuf::from(get_required_str(params, "newPath")?);
    let dry_run = get_optional_bool(params, "dryRun")?.unwrap_or(false);

    let contacts = match params.get("contactsPath").and_then(|v| v.as_str()) {
        Some(path) => notify::load_contacts(Path::new(path)).map_err(|e| {
            HandlerErr::new("contacts_load_failed", format!("{:#}", e))
                .with_details(json!({ "path": path }))
        })?,
        None => ContactMap::new(),
    };

    // Without SMTP settings every change is reported but nothing is sent.
    let mailer = match (&state.config.smtp, dry_run) {
        (Some(settings), false) => Some(
            SmtpMailer::new(settings)
                .map_err(|e| HandlerErr::new("smtp_config_failed", format!("{:#}", e)))?,
        ),
        _ => None,
    };
    let transport = mailer.as_ref().map(|m| m as &dyn MailTransport);

    compare::run_compare_with(
        &old_path,
        &new_path,
        &contacts,
        state.config.encryption_key.as_ref(),
        transport,
        &state.config.dashboard_url,
    )
    .map_err(snapshot_err)
}

fn handle_diff_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    match run(state, &req.params) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => {
            log::error!("event=diff_failed code={} error={}", e.code, e.message);
            e.response(&req.id)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "diff.run" => Some(handle_diff_run(state, req)),
        _ => None,
    }
}
