mod server_log;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use ruledraw_core::RuleEntry;
use ruledraw_history::wire::{
    AddResponse, ListResponse, RecentResponse, StatsResponse, UndoResponse, ADD_PATH, HEALTH_PATH,
    LIST_PATH, RECENT_PATH, STATS_PATH, UNDO_PATH,
};
use serde::Serialize;
use serde_json::{json, Value};
use server_log::ServerLog;
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:8502";
const DEFAULT_LIST_LIMIT: usize = 20;
const DEFAULT_RECENT_LIMIT: usize = 10;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let bind = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RULEDRAW_BIND").ok())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let server = Server::http(&bind).map_err(|err| anyhow!("bind {bind}: {err}"))?;
    info!(%bind, "history service listening");

    let log = Arc::new(Mutex::new(ServerLog::new()));
    for request in server.incoming_requests() {
        if let Err(err) = handle_request(request, &log) {
            warn!(error = %err, "request failed");
        }
    }
    Ok(())
}

/// Status plus optional JSON body; `None` answers with an empty body.
#[derive(Debug, PartialEq)]
struct Reply {
    status: u16,
    body: Option<Value>,
}

impl Reply {
    fn ok(body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self {
                status: 200,
                body: Some(body),
            },
            Err(err) => Self::error(500, &format!("encode failed: {err}")),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: Some(json!({"ok": false, "error": message})),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }
}

fn handle_request(mut request: tiny_http::Request, log: &Mutex<ServerLog>) -> anyhow::Result<()> {
    let method = request.method().clone();
    let url = request.url().to_string();
    let mut body = String::new();
    if method == Method::Post {
        request
            .as_reader()
            .read_to_string(&mut body)
            .context("read request body")?;
    }
    let (reply, records) = {
        let mut log = log.lock().map_err(|_| anyhow!("history log lock poisoned"))?;
        let reply = route(&mut log, &method, &url, &body, Utc::now());
        (reply, log.len())
    };
    debug!(%method, %url, status = reply.status, records, "handled");

    let data = match &reply.body {
        Some(body) => serde_json::to_vec(body)?,
        None => Vec::new(),
    };
    let mut response = Response::from_data(data).with_status_code(StatusCode(reply.status));
    for header in cors_headers(reply.body.is_some()) {
        response = response.with_header(header);
    }
    request.respond(response)?;
    Ok(())
}

fn cors_headers(json: bool) -> Vec<Header> {
    let mut raw = vec![
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ];
    if json {
        raw.push(("Content-Type", "application/json; charset=utf-8"));
    }
    raw.into_iter()
        .filter_map(|(name, value)| Header::from_bytes(name.as_bytes(), value.as_bytes()).ok())
        .collect()
}

fn route(log: &mut ServerLog, method: &Method, url: &str, body: &str, now: DateTime<Utc>) -> Reply {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    match method {
        Method::Options => Reply::no_content(),
        Method::Get => match path {
            HEALTH_PATH => Reply::ok(json!({
                "ok": true,
                "db_connected": true,
                "mode": "memory",
                "max_records_per_client": log.per_client_cap(),
            })),
            LIST_PATH | RECENT_PATH | STATS_PATH => get_history(log, path, &params, now),
            _ => Reply::error(404, "not found"),
        },
        Method::Post => match path {
            ADD_PATH | UNDO_PATH => {
                let payload = if body.trim().is_empty() { "{}" } else { body };
                match serde_json::from_str::<Value>(payload) {
                    Ok(payload) if path == ADD_PATH => add(log, &payload, now),
                    Ok(payload) => undo(log, &payload),
                    Err(_) => Reply::error(400, "invalid json"),
                }
            }
            _ => Reply::error(404, "not found"),
        },
        _ => Reply::error(404, "not found"),
    }
}

fn get_history(
    log: &ServerLog,
    path: &str,
    params: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Reply {
    let Some(client_id) = params.get("client_id").filter(|id| !id.is_empty()) else {
        return Reply::error(400, "missing client_id");
    };
    let default_limit = if path == RECENT_PATH {
        DEFAULT_RECENT_LIMIT
    } else {
        DEFAULT_LIST_LIMIT
    };
    let limit = match params.get("limit") {
        None => default_limit,
        Some(raw) => match raw.parse::<usize>() {
            Ok(limit) => limit,
            Err(_) => return Reply::error(400, "invalid limit"),
        },
    };

    match path {
        LIST_PATH => Reply::ok(ListResponse {
            ok: true,
            items: log.list(client_id, limit),
            error: None,
        }),
        RECENT_PATH => Reply::ok(RecentResponse {
            ok: true,
            ids: log.recent(client_id, limit),
            error: None,
        }),
        _ => Reply::ok(StatsResponse {
            ok: true,
            stats: log.stats(client_id, now.date_naive()),
        }),
    }
}

fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn add(log: &mut ServerLog, payload: &Value, now: DateTime<Utc>) -> Reply {
    let Some(client_id) = non_empty_str(payload, "client_id") else {
        return Reply::error(400, "missing client_id");
    };
    let (Some(id), Some(content)) = (non_empty_str(payload, "id"), non_empty_str(payload, "content"))
    else {
        return Reply::error(400, "missing_fields");
    };
    let category = payload
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let item = log.add(client_id, &RuleEntry::new(id, content, category), now);
    info!(id = item.id, rule = %item.rule_id, "history add");
    Reply::ok(AddResponse {
        ok: true,
        item: Some(item),
        error: None,
    })
}

fn undo(log: &mut ServerLog, payload: &Value) -> Reply {
    let Some(client_id) = non_empty_str(payload, "client_id") else {
        return Reply::error(400, "missing client_id");
    };
    let ids: Vec<i64> = payload
        .get("ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    if !ids.is_empty() {
        let count = log.delete_ids(client_id, &ids);
        info!(count, "history undo by ids");
        return Reply::ok(UndoResponse {
            ok: true,
            deleted_count: Some(count),
            ..UndoResponse::default()
        });
    }
    match log.delete_newest(client_id) {
        Some(item) => Reply::ok(UndoResponse {
            ok: true,
            item: Some(item),
            ..UndoResponse::default()
        }),
        None => Reply::ok(UndoResponse {
            ok: false,
            message: Some("no record to undo".to_string()),
            ..UndoResponse::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("time")
    }

    fn get(log: &mut ServerLog, url: &str) -> Reply {
        route(log, &Method::Get, url, "", now())
    }

    fn post(log: &mut ServerLog, path: &str, body: Value) -> Reply {
        route(log, &Method::Post, path, &body.to_string(), now())
    }

    fn add_rule(log: &mut ServerLog, client: &str, id: &str, category: &str) -> Reply {
        post(
            log,
            ADD_PATH,
            json!({"id": id, "content": format!("content {id}"), "category": category, "client_id": client}),
        )
    }

    fn body(reply: &Reply) -> &Value {
        reply.body.as_ref().expect("json body")
    }

    #[test]
    fn health_reports_memory_mode() {
        let mut log = ServerLog::new();
        let reply = get(&mut log, HEALTH_PATH);
        assert_eq!(reply.status, 200);
        assert_eq!(body(&reply)["mode"], "memory");
        assert_eq!(body(&reply)["db_connected"], true);
        assert_eq!(body(&reply)["max_records_per_client"], 1000);
    }

    #[test]
    fn options_is_empty_no_content() {
        let mut log = ServerLog::new();
        let reply = route(&mut log, &Method::Options, LIST_PATH, "", now());
        assert_eq!(reply, Reply::no_content());
    }

    #[test]
    fn add_then_list_and_recent() {
        let mut log = ServerLog::new();
        let reply = add_rule(&mut log, "cid_a", "TAC-01", "tactical");
        assert_eq!(reply.status, 200);
        assert_eq!(body(&reply)["item"]["id"], 1);
        assert_eq!(body(&reply)["item"]["timestamp"], "2026-06-01T08:00:00.000Z");
        add_rule(&mut log, "cid_a", "SOC-01", "social");

        let list = get(&mut log, &format!("{LIST_PATH}?limit=1&client_id=cid_a"));
        assert_eq!(body(&list)["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(body(&list)["items"][0]["rule_id"], "SOC-01");

        let recent = get(&mut log, &format!("{RECENT_PATH}?client_id=cid_a"));
        assert_eq!(body(&recent)["ids"], json!(["SOC-01", "TAC-01"]));
    }

    #[test]
    fn stats_are_per_client() {
        let mut log = ServerLog::new();
        add_rule(&mut log, "cid_a", "TAC-01", "tactical");
        add_rule(&mut log, "cid_a", "TAC-02", "tactical");
        add_rule(&mut log, "cid_a", "SOC-01", "social");
        add_rule(&mut log, "cid_b", "SOC-01", "social");

        let reply = get(&mut log, &format!("{STATS_PATH}?client_id=cid_a"));
        let stats = body(&reply);
        assert_eq!(stats["ok"], true);
        assert_eq!(stats["today_count"], 3);
        assert_eq!(stats["top_category"], "tactical");
        assert_eq!(stats["top_pct"], 67);
    }

    #[test]
    fn missing_client_and_fields_are_bad_requests() {
        let mut log = ServerLog::new();
        let reply = get(&mut log, LIST_PATH);
        assert_eq!(reply.status, 400);
        assert_eq!(body(&reply)["error"], "missing client_id");

        let reply = post(&mut log, ADD_PATH, json!({"id": "TAC-01", "client_id": "cid_a"}));
        assert_eq!(reply.status, 400);
        assert_eq!(body(&reply)["error"], "missing_fields");

        let reply = route(&mut log, &Method::Post, ADD_PATH, "{oops", now());
        assert_eq!(reply.status, 400);

        let reply = get(&mut log, &format!("{LIST_PATH}?limit=many&client_id=cid_a"));
        assert_eq!(reply.status, 400);
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn unknown_paths_are_not_found() {
        let mut log = ServerLog::new();
        assert_eq!(get(&mut log, "/api/nope").status, 404);
        assert_eq!(post(&mut log, "/api/nope", json!({})).status, 404);
        assert_eq!(route(&mut log, &Method::Delete, LIST_PATH, "", now()).status, 404);
    }

    #[test]
    fn undo_by_ids_and_newest() {
        let mut log = ServerLog::new();
        add_rule(&mut log, "cid_a", "TAC-01", "tactical");
        add_rule(&mut log, "cid_a", "TAC-02", "tactical");
        add_rule(&mut log, "cid_a", "SOC-01", "social");

        let reply = post(&mut log, UNDO_PATH, json!({"ids": [2, 3], "client_id": "cid_a"}));
        assert_eq!(body(&reply)["deleted_count"], 2);

        let reply = post(&mut log, UNDO_PATH, json!({"client_id": "cid_a"}));
        assert_eq!(body(&reply)["item"]["id"], 1);

        let reply = post(&mut log, UNDO_PATH, json!({"client_id": "cid_a"}));
        assert_eq!(reply.status, 200);
        assert_eq!(body(&reply)["ok"], false);
        assert_eq!(body(&reply)["message"], "no record to undo");
    }
}
