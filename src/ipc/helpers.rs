use rusqlite::Connection;
use serde_json::Value;

use crate::ipc::error::err;
use crate::ipc::types::{Actor, AppState, Request};
use crate::model::Role;

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn optional_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

pub fn optional_f64(req: &Request, key: &str) -> Option<f64> {
    req.params.get(key).and_then(|v| v.as_f64())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_actor<'a>(req: &'a Request) -> Result<&'a Actor, Value> {
    req.actor
        .as_ref()
        .ok_or_else(|| err(&req.id, "not_authenticated", "request carries no actor", None))
}

pub fn require_role<'a>(req: &'a Request, roles: &[Role]) -> Result<&'a Actor, Value> {
    let actor = require_actor(req)?;
    if roles.contains(&actor.role) {
        Ok(actor)
    } else {
        Err(err(
            &req.id,
            "forbidden",
            format!("requires one of roles: {:?}", roles.iter().map(|r| r.as_str()).collect::<Vec<_>>()),
            None,
        ))
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
