use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::ai::AiClient;
use crate::model::Role;
use crate::ocr::OcrClient;

/// Request-scoped identity. Handlers read the caller's id and role from
/// here instead of any ambient session state.
#[derive(Debug, Deserialize, Clone)]
pub struct Actor {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub actor: Option<Actor>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub ai: AiClient,
    pub ocr: OcrClient,
    /// Tolerance applied to numerical questions that carry none of their
    /// own. Zero means exact match.
    pub default_tolerance: f64,
}
