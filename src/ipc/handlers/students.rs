use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, RosterEntry};
use rusqlite::Connection;
use serde_json::json;

/// Roster rows come inline as `params.students` or from a JSON file at `params.path`.
fn roster_from_params(params: &serde_json::Value) -> Result<Vec<RosterEntry>, HandlerErr> {
    let raw = if let Some(inline) = params.get("students") {
        inline.clone()
    } else if let Some(path) = params.get("path").and_then(|v| v.as_str()) {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": path }))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            HandlerErr::new("bad_params", format!("roster file is not JSON: {}", e))
                .with_details(json!({ "path": path }))
        })?
    } else {
        return Err(HandlerErr::new(
            "bad_params",
            "missing params.students or params.path",
        ));
    };

    let entries: Vec<RosterEntry> = serde_json::from_value(raw)
        .map_err(|e| HandlerErr::new("bad_params", format!("invalid roster: {}", e)))?;
    for (i, e) in entries.iter().enumerate() {
        if e.prn.trim().is_empty() {
            return Err(HandlerErr::new("bad_params", "roster entry has an empty prn")
                .with_details(json!({ "index": i })));
        }
        let valid_date = chrono::NaiveDate::from_ymd_opt(e.dob_year, e.dob_month, e.dob_day);
        if valid_date.is_none() {
            return Err(
                HandlerErr::new("bad_params", format!("invalid date of birth for {}", e.prn))
                    .with_details(json!({ "index": i, "prn": e.prn })),
            );
        }
    }
    Ok(entries)
}

fn import(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let entries = roster_from_params(params)?;
    let imported = store::import_students(conn, &entries)
        .map_err(|e| HandlerErr::new("db_tx_failed", format!("{:#}", e)))?;
    let total = store::student_count(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{:#}", e)))?;
    log::info!("event=students_imported imported={} total={}", imported, total);
    Ok(json!({ "imported": imported, "total": total }))
}

fn handle_students_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match import(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match store::list_students(conn) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", format!("{:#}", e), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.import" => Some(handle_students_import(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
