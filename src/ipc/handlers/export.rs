use crate::ipc::error::{get_optional_bool, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::snapshot;
use crate::store;
use anyhow::Context;
use serde_json::json;
use std::path::PathBuf;

fn export(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let encrypt = get_optional_bool(params, "encrypt")?.unwrap_or(false);
    let key = match (encrypt, state.config.encryption_key.as_ref()) {
        (false, _) => None,
        (true, Some(key)) => Some(key),
        (true, None) => {
            return Err(HandlerErr::new(
                "no_encryption_key",
                "encrypted export requested but MARKSYNCD_ENCRYPTION_KEY is not set",
            ))
        }
    };

    let records = store::export_rows(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{:#}", e)))?;
    let text = snapshot::render_export(&records, key)
        .map_err(|e| HandlerErr::new("export_failed", format!("{:#}", e)))?;
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))
            .map_err(|e| HandlerErr::new("io_failed", format!("{:#}", e)))?;
    }
    std::fs::write(&out_path, text)
        .with_context(|| format!("failed to write {}", out_path.display()))
        .map_err(|e| HandlerErr::new("io_failed", format!("{:#}", e)))?;

    log::info!(
        "event=marks_exported path={} records={} encrypted={}",
        out_path.display(),
        records.len(),
        key.is_some()
    );
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "records": records.len(),
        "encrypted": key.is_some(),
    }))
}

fn handle_marks_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    match export(state, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.export" => Some(handle_marks_export(state, req)),
        _ => None,
    }
}
