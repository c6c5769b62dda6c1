use rusqlite::OptionalExtension;
use serde_json::json;

use crate::ai::AiClient;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_i64, require_role};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttemptStatus, QuestionKind, Role};
use crate::ocr::OcrClient;
use crate::scoring::{self, AnswerEvaluation};

struct AnswerRow {
    answer_id: i64,
    question_id: i64,
    text: Option<String>,
    selected_option: Option<i64>,
    image_url: Option<String>,
    ocr_text: Option<String>,
    kind: QuestionKind,
    question_text: String,
    correct_answer: Option<String>,
    marks: f64,
    tolerance: Option<f64>,
    ai_rubric: Option<String>,
}

/// One answer through the pipeline. This never fails: an unreachable or
/// misbehaving external service degrades the answer to the zero-score
/// manual-review outcome, and the attempt carries on.
fn evaluate_answer(ai: &AiClient, ocr: &OcrClient, row: &AnswerRow) -> AnswerEvaluation {
    if row.kind.is_objective() {
        let outcome = match row.kind {
            QuestionKind::Mcq => scoring::score_mcq(
                row.selected_option,
                row.correct_answer.as_deref(),
                row.marks,
            ),
            _ => scoring::score_numerical(
                row.text.as_deref(),
                row.correct_answer.as_deref(),
                row.marks,
                row.tolerance,
            ),
        };
        return AnswerEvaluation {
            answer_id: row.answer_id,
            question_id: row.question_id,
            score: outcome.score,
            is_correct: Some(outcome.is_correct),
            confidence: None,
            feedback: None,
            ocr_text: None,
        };
    }

    // Subjective: recover the answer text, running OCR for image-backed
    // answers that have not been recognized yet.
    let mut recognized: Option<String> = None;
    let answer_text = if let Some(existing) = row.ocr_text.as_deref() {
        Some(existing.to_string())
    } else if let Some(image) = row.image_url.as_deref() {
        match ocr.recognize(image) {
            Ok(result) => {
                recognized = Some(result.text.clone());
                Some(result.text)
            }
            Err(e) => {
                tracing::warn!(answer_id = row.answer_id, error = %e, "ocr failed, degrading answer");
                None
            }
        }
    } else {
        row.text.clone()
    };

    let evaluation = match answer_text {
        Some(text) if !text.trim().is_empty() => ai.evaluate_subjective_answer(
            &text,
            &row.question_text,
            row.ai_rubric.as_deref().unwrap_or(""),
            row.marks,
        ),
        _ => crate::ai::SubjectiveEvaluation::manual_review_fallback(),
    };

    AnswerEvaluation {
        answer_id: row.answer_id,
        question_id: row.question_id,
        score: evaluation.score,
        is_correct: None,
        confidence: Some(evaluation.confidence),
        feedback: Some(evaluation.feedback),
        ocr_text: recognized,
    }
}

fn handle_attempts_evaluate(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_role(req, &[Role::Teacher, Role::Admin]) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let attempt_id = match required_i64(req, "attemptId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let status: Option<String> = match conn
        .query_row(
            "SELECT status FROM test_attempts WHERE id = ?",
            [attempt_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(status) = status else {
        return err(&req.id, "not_found", "attempt not found", None);
    };
    match AttemptStatus::parse(&status) {
        Some(AttemptStatus::Completed) => {}
        Some(AttemptStatus::InProgress) => {
            return err(&req.id, "conflict", "attempt has not been submitted yet", None)
        }
        Some(AttemptStatus::Evaluated) => {
            return err(&req.id, "conflict", "attempt has already been evaluated", None)
        }
        None => {
            return err(&req.id, "db_query_failed", format!("corrupt status: {}", status), None)
        }
    }

    let mut stmt = match conn.prepare(
        "SELECT a.id, a.question_id, a.text, a.selected_option, a.image_url, a.ocr_text,
                q.type, q.text, q.correct_answer, q.marks, q.tolerance, q.ai_rubric
         FROM answers a
         JOIN questions q ON q.id = a.question_id
         WHERE a.attempt_id = ?
         ORDER BY q.ord",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    type RawRow = (
        i64,
        i64,
        Option<String>,
        Option<i64>,
        Option<String>,
        Option<String>,
        String,
        String,
        Option<String>,
        i64,
        Option<f64>,
        Option<String>,
    );
    let rows = stmt
        .query_map([attempt_id], |r| {
            Ok::<RawRow, rusqlite::Error>((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
                r.get(6)?,
                r.get(7)?,
                r.get(8)?,
                r.get(9)?,
                r.get(10)?,
                r.get(11)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let raw_rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let default_tolerance = state.default_tolerance;
    let mut answer_rows: Vec<AnswerRow> = Vec::with_capacity(raw_rows.len());
    for raw in raw_rows {
        let Some(kind) = QuestionKind::parse(&raw.6) else {
            return err(&req.id, "db_query_failed", format!("corrupt question type: {}", raw.6), None);
        };
        answer_rows.push(AnswerRow {
            answer_id: raw.0,
            question_id: raw.1,
            text: raw.2,
            selected_option: raw.3,
            image_url: raw.4,
            ocr_text: raw.5,
            kind,
            question_text: raw.7,
            correct_answer: raw.8,
            marks: raw.9 as f64,
            // A question without its own tolerance inherits the workspace
            // default; an explicit zero stays exact.
            tolerance: raw.10.or(Some(default_tolerance)),
            ai_rubric: raw.11,
        });
    }

    // Sequential per-answer pipeline, then one fold into the attempt score.
    let evaluations: Vec<AnswerEvaluation> = answer_rows
        .iter()
        .map(|row| evaluate_answer(&state.ai, &state.ocr, row))
        .collect();
    let total = scoring::attempt_total(&evaluations);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for eval in &evaluations {
        if let Err(e) = tx.execute(
            "UPDATE answers
             SET score = ?, is_correct = ?, ai_confidence = ?, ai_feedback = ?,
                 ocr_text = COALESCE(?, ocr_text)
             WHERE id = ?",
            (
                eval.score,
                eval.is_correct,
                eval.confidence,
                &eval.feedback,
                &eval.ocr_text,
                eval.answer_id,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "answers" })),
            );
        }
    }
    if let Err(e) = tx.execute(
        "UPDATE test_attempts SET score = ?, status = 'evaluated' WHERE id = ?",
        (total, attempt_id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(attempt_id, score = total, answers = evaluations.len(), "attempt evaluated");
    ok(
        &req.id,
        json!({
            "attemptId": attempt_id,
            "status": AttemptStatus::Evaluated.as_str(),
            "score": total,
            "answers": evaluations,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attempts.evaluate" => Some(handle_attempts_evaluate(state, req)),
        _ => None,
    }
}
