use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::portal::PortalClient;
use crate::scrape;
use serde_json::json;

fn portal_client(state: &AppState) -> anyhow::Result<PortalClient> {
    let config = &state.config;
    let client = PortalClient::new(&config.portal_url, &config.user_agent, config.request_timeout)?;
    log::debug!("event=portal_client login_url={}", client.login_url());
    Ok(client)
}

fn handle_scrape_one(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let offset = match req.params.get("offset") {
        None | Some(serde_json::Value::Null) => 0,
        Some(v) => match v.as_u64() {
            Some(n) => n as usize,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "params.offset must be a non-negative integer",
                    Some(json!({ "offset": v })),
                )
            }
        },
    };
    let client = match portal_client(state) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "http_client_failed", format!("{:#}", e), None),
    };
    match scrape::scrape_one(conn, &client, offset) {
        Ok(outcome) => ok(&req.id, json!(outcome)),
        Err(e) => err(&req.id, "db_query_failed", format!("{:#}", e), None),
    }
}

fn handle_scrape_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let client = match portal_client(state) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "http_client_failed", format!("{:#}", e), None),
    };
    match scrape::scrape_all(conn, &client) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => err(&req.id, "db_query_failed", format!("{:#}", e), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scrape.one" => Some(handle_scrape_one(state, req)),
        "scrape.all" => Some(handle_scrape_all(state, req)),
        _ => None,
    }
}
