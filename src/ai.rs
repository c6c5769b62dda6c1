//! Language-model evaluation adapter. Every public operation is one
//! chat-completions round trip with structured JSON output; any failure
//! (transport, status, schema violation) degrades to a canned fallback
//! value instead of an error. No retry, no backoff.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::scoring;

pub const MANUAL_REVIEW_FEEDBACK: &str =
    "Unable to evaluate answer due to system error. Please review manually.";

const FALLBACK_PLAN: &str =
    "Study plan generation failed. Please focus on reviewing the weak topics identified in your assessment.";

const FALLBACK_RECOMMENDATIONS: &str =
    "Performance analysis failed. Please review individual student results.";

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl AiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ASSESSD_AI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("ASSESSD_AI_API_KEY").unwrap_or_default(),
            model: std::env::var("ASSESSD_AI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            timeout_secs: std::env::var("ASSESSD_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model endpoint returned status {0}")]
    BadStatus(u16),
    #[error("malformed model payload: {0}")]
    MalformedPayload(String),
}

pub struct AiClient {
    config: AiConfig,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectiveEvaluation {
    pub score: f64,
    pub confidence: f64,
    pub feedback: String,
}

impl SubjectiveEvaluation {
    pub fn manual_review_fallback() -> Self {
        Self {
            score: 0.0,
            confidence: 0.0,
            feedback: MANUAL_REVIEW_FEEDBACK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyResource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub plan: String,
    pub resources: Vec<StudyResource>,
}

impl StudyPlan {
    pub fn fallback() -> Self {
        Self {
            plan: FALLBACK_PLAN.to_string(),
            resources: vec![StudyResource {
                title: "General review resources".to_string(),
                kind: "general".to_string(),
                url: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub question_id: i64,
    pub score: f64,
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub student_id: i64,
    pub score: f64,
    pub answers: Vec<AnswerResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardQuestion {
    pub question_id: i64,
    pub question: String,
    pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInsights {
    pub average_score: f64,
    pub hardest_questions: Vec<HardQuestion>,
    pub recommendations: String,
}

impl AiClient {
    pub fn new(config: AiConfig) -> Self {
        let http = build_http(config.timeout_secs);
        Self { config, http }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn evaluate_subjective_answer(
        &self,
        student_answer: &str,
        question: &str,
        rubric: &str,
        max_marks: f64,
    ) -> SubjectiveEvaluation {
        let system = format!(
            "You are an expert teacher evaluating student answers. \
             Given the question, rubric, and student's answer, provide an evaluation with: \
             1. A score between 0 and {max_marks} (can be decimal) \
             2. A confidence level between 0 and 100 indicating how certain you are of your evaluation \
             3. Constructive feedback explaining the score. \
             Respond with JSON in this format: {{ \"score\": number, \"confidence\": number, \"feedback\": string }}"
        );
        let user = format!(
            "Question: {question}\nRubric: {rubric}\nStudent Answer: {student_answer}"
        );

        match self
            .chat_json(&system, &user)
            .and_then(|v| parse_evaluation(v, max_marks))
        {
            Ok(eval) => eval,
            Err(e) => {
                tracing::warn!(error = %e, "subjective evaluation fell back");
                SubjectiveEvaluation::manual_review_fallback()
            }
        }
    }

    pub fn generate_study_plan(
        &self,
        weak_topics: &[String],
        strong_topics: &[String],
        subject: &str,
    ) -> StudyPlan {
        let system = "Generate a personalized study plan focused on improving weak topics, \
             along with recommended resources. Return a JSON object with two fields: \
             1. \"plan\": a structured study plan with bullet points and time estimates \
             2. \"resources\": an array of recommended resources, each with \"title\", \
             \"type\" (video, article, practice), and optional \"url\". \
             Keep the response concise and focused on actionable advice.";
        let user = format!(
            "Subject: {subject}\nWeak Topics: {}\nStrong Topics: {}",
            weak_topics.join(", "),
            strong_topics.join(", ")
        );

        match self
            .chat_json(system, &user)
            .and_then(|v| {
                serde_json::from_value::<StudyPlan>(v)
                    .map_err(|e| AiError::MalformedPayload(e.to_string()))
            }) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "study plan generation fell back");
                StudyPlan::fallback()
            }
        }
    }

    pub fn analyze_test_performance(&self, results: &[StudentResult]) -> PerformanceInsights {
        let system = "Analyze test performance data and provide insights. \
             Return a JSON object with: \
             1. \"averageScore\": the calculated average score \
             2. \"hardestQuestions\": an array of questions with lowest average scores (max 3), \
             each with \"questionId\", \"question\", and \"avgScore\" \
             3. \"recommendations\": teaching recommendations based on the results";
        let data = serde_json::to_string(results).unwrap_or_else(|_| "[]".to_string());
        let user = format!("Test Data: {data}");

        match self
            .chat_json(system, &user)
            .and_then(|v| {
                serde_json::from_value::<PerformanceInsights>(v)
                    .map_err(|e| AiError::MalformedPayload(e.to_string()))
            }) {
            Ok(mut insights) => {
                insights.hardest_questions.truncate(3);
                insights
            }
            Err(e) => {
                tracing::warn!(error = %e, "performance analysis fell back");
                PerformanceInsights {
                    average_score: local_average(results),
                    hardest_questions: Vec::new(),
                    recommendations: FALLBACK_RECOMMENDATIONS.to_string(),
                }
            }
        }
    }

    /// One completion round trip. The model is instructed to reply with a
    /// JSON object; the parsed object is returned for the caller to
    /// validate against its own schema.
    fn chat_json(&self, system: &str, user: &str) -> Result<serde_json::Value, AiError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "response_format": { "type": "json_object" }
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()?;
        if !resp.status().is_success() {
            return Err(AiError::BadStatus(resp.status().as_u16()));
        }

        let envelope: serde_json::Value = resp.json()?;
        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AiError::MalformedPayload("missing message content".to_string()))?;
        serde_json::from_str(content).map_err(|e| AiError::MalformedPayload(e.to_string()))
    }
}

fn build_http(timeout_secs: u64) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    score: f64,
    confidence: f64,
    feedback: String,
}

/// Strict parse of the model's evaluation object; out-of-range values are
/// clamped, missing or mistyped fields are a malformed-payload failure.
fn parse_evaluation(value: serde_json::Value, max_marks: f64) -> Result<SubjectiveEvaluation, AiError> {
    let raw: RawEvaluation =
        serde_json::from_value(value).map_err(|e| AiError::MalformedPayload(e.to_string()))?;
    Ok(SubjectiveEvaluation {
        score: scoring::clamp_score(raw.score, max_marks),
        confidence: scoring::clamp_confidence(raw.confidence),
        feedback: raw.feedback,
    })
}

fn local_average(results: &[StudentResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
}
