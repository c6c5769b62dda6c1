//! OCR engine adapter. One request, one parse; an unreachable engine or
//! a malformed body is surfaced to the caller as an error. Retry policy
//! belongs to the caller, not this layer.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::scoring;

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub base_url: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl OcrConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ASSESSD_OCR_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8884".to_string()),
            language: std::env::var("ASSESSD_OCR_LANGUAGE").unwrap_or_else(|_| "eng".to_string()),
            timeout_secs: std::env::var("ASSESSD_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ocr engine returned status {0}")]
    BadStatus(u16),
    #[error("malformed ocr payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,
}

pub struct OcrClient {
    config: OcrConfig,
    http: reqwest::blocking::Client,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { config, http }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Recognize handwritten text from an image given as raw base64 or a
    /// data URI. Confidence is normalized into 0-100 on receipt.
    pub fn recognize(&self, image_data: &str) -> Result<OcrResult, OcrError> {
        let base64_data = strip_data_uri(image_data);
        let url = format!("{}/recognize", self.config.base_url.trim_end_matches('/'));

        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "image": base64_data,
                "language": self.config.language,
            }))
            .send()?;
        if !resp.status().is_success() {
            return Err(OcrError::BadStatus(resp.status().as_u16()));
        }

        let result: OcrResult = resp
            .json()
            .map_err(|e| OcrError::MalformedPayload(e.to_string()))?;
        if !result.confidence.is_finite() {
            return Err(OcrError::MalformedPayload(
                "confidence is not a finite number".to_string(),
            ));
        }
        Ok(OcrResult {
            text: result.text,
            confidence: scoring::clamp_confidence(result.confidence),
        })
    }
}

/// Uploads arrive either as raw base64 or as a full data URI
/// (`data:image/jpeg;base64,...`); the engine wants bare base64.
fn strip_data_uri(image_data: &str) -> &str {
    match image_data.split_once("base64,") {
        Some((_, rest)) => rest,
        None => image_data,
    }
}
