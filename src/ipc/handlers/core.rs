use serde_json::json;
use std::path::PathBuf;

use crate::ai::{AiClient, AiConfig};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_f64, optional_i64, optional_str};
use crate::ipc::types::{AppState, Request};
use crate::ocr::{OcrClient, OcrConfig};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

/// Override the outbound service endpoints at runtime. Anything not
/// supplied keeps its current value; clients are rebuilt so a new
/// timeout takes effect immediately.
fn handle_services_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let timeout = optional_i64(req, "timeoutSecs").map(|v| v.max(1) as u64);

    if let Some(tolerance) = optional_f64(req, "defaultTolerance") {
        if tolerance < 0.0 {
            return err(&req.id, "bad_params", "defaultTolerance must not be negative", None);
        }
        state.default_tolerance = tolerance;
    }

    let mut ai_cfg = AiConfig {
        base_url: state.ai.config().base_url.clone(),
        api_key: state.ai.config().api_key.clone(),
        model: state.ai.config().model.clone(),
        timeout_secs: timeout.unwrap_or(state.ai.config().timeout_secs),
    };
    if let Some(v) = optional_str(req, "aiBaseUrl") {
        ai_cfg.base_url = v;
    }
    if let Some(v) = optional_str(req, "aiApiKey") {
        ai_cfg.api_key = v;
    }
    if let Some(v) = optional_str(req, "aiModel") {
        ai_cfg.model = v;
    }

    let mut ocr_cfg = OcrConfig {
        base_url: state.ocr.config().base_url.clone(),
        language: state.ocr.config().language.clone(),
        timeout_secs: timeout.unwrap_or(state.ocr.config().timeout_secs),
    };
    if let Some(v) = optional_str(req, "ocrBaseUrl") {
        ocr_cfg.base_url = v;
    }
    if let Some(v) = optional_str(req, "ocrLanguage") {
        ocr_cfg.language = v;
    }

    state.ai = AiClient::new(ai_cfg);
    state.ocr = OcrClient::new(ocr_cfg);
    ok(
        &req.id,
        json!({
            "aiBaseUrl": state.ai.config().base_url,
            "aiModel": state.ai.config().model,
            "ocrBaseUrl": state.ocr.config().base_url,
            "timeoutSecs": state.ai.config().timeout_secs,
            "defaultTolerance": state.default_tolerance,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "services.configure" => Some(handle_services_configure(state, req)),
        _ => None,
    }
}
