use rusqlite::{OptionalExtension, Row};
use serde_json::json;
use std::collections::HashSet;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_rfc3339, required_i64, require_role};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttemptStatus, QuestionKind, Role, TestStatus};

pub(crate) fn attempt_json(row: &Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let test_id: i64 = row.get(1)?;
    let student_id: i64 = row.get(2)?;
    let start_time: String = row.get(3)?;
    let end_time: Option<String> = row.get(4)?;
    let score: Option<f64> = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(json!({
        "id": id,
        "testId": test_id,
        "studentId": student_id,
        "startTime": start_time,
        "endTime": end_time,
        "score": score,
        "status": status,
    }))
}

pub(crate) const ATTEMPT_COLUMNS: &str =
    "id, test_id, student_id, start_time, end_time, score, status";

fn answer_json(row: &Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let question_id: i64 = row.get(1)?;
    let text: Option<String> = row.get(2)?;
    let selected_option: Option<i64> = row.get(3)?;
    let image_url: Option<String> = row.get(4)?;
    let ocr_text: Option<String> = row.get(5)?;
    let score: Option<f64> = row.get(6)?;
    let ai_confidence: Option<f64> = row.get(7)?;
    let ai_feedback: Option<String> = row.get(8)?;
    let is_correct: Option<bool> = row.get(9)?;
    Ok(json!({
        "id": id,
        "questionId": question_id,
        "text": text,
        "selectedOption": selected_option,
        "imageUrl": image_url,
        "ocrText": ocr_text,
        "score": score,
        "aiConfidence": ai_confidence,
        "aiFeedback": ai_feedback,
        "isCorrect": is_correct,
    }))
}

fn handle_attempts_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_role(req, &[Role::Student]) {
        Ok(a) => a.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let test_id = match required_i64(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let status: Option<String> = match conn
        .query_row("SELECT status FROM tests WHERE id = ?", [test_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(status) = status else {
        return err(&req.id, "not_found", "test not found", None);
    };
    if TestStatus::parse(&status) != Some(TestStatus::Published) {
        return err(&req.id, "conflict", "test is not open for attempts", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO test_attempts(test_id, student_id, start_time, status)
         VALUES(?, ?, ?, 'in_progress')",
        (test_id, actor.user_id, now_rfc3339()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "test_attempts" })),
        );
    }

    ok(
        &req.id,
        json!({ "attemptId": conn.last_insert_rowid(), "status": "in_progress" }),
    )
}

struct AnswerInput {
    question_id: i64,
    text: Option<String>,
    selected_option: Option<i64>,
    image_url: Option<String>,
}

/// Exactly one of {selectedOption, text, imageUrl} may be present, and it
/// must be the one the question type expects. Anything else is rejected
/// before any row is written.
fn validate_answer_input(input: &AnswerInput, kind: QuestionKind) -> Result<(), String> {
    let provided = [
        input.selected_option.is_some(),
        input.text.is_some(),
        input.image_url.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();
    if provided != 1 {
        return Err(format!(
            "question {} requires exactly one of selectedOption, text, imageUrl",
            input.question_id
        ));
    }
    let valid = match kind {
        QuestionKind::Mcq => input.selected_option.is_some(),
        QuestionKind::Numerical => input.text.is_some(),
        QuestionKind::Short | QuestionKind::Long => {
            input.text.is_some() || input.image_url.is_some()
        }
    };
    if !valid {
        return Err(format!(
            "question {} does not accept that input for type {}",
            input.question_id,
            kind.as_str()
        ));
    }
    Ok(())
}

fn handle_attempts_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_role(req, &[Role::Student]) {
        Ok(a) => a.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let attempt_id = match required_i64(req, "attemptId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let row: Option<(i64, i64, String)> = match conn
        .query_row(
            "SELECT test_id, student_id, status FROM test_attempts WHERE id = ?",
            [attempt_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((test_id, student_id, status)) = row else {
        return err(&req.id, "not_found", "attempt not found", None);
    };
    if student_id != actor.user_id {
        return err(&req.id, "forbidden", "attempt belongs to another student", None);
    }
    if AttemptStatus::parse(&status) != Some(AttemptStatus::InProgress) {
        return err(&req.id, "conflict", "attempt has already been submitted", None);
    }

    let Some(answers_value) = req.params.get("answers").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing answers array", None);
    };

    let mut inputs: Vec<AnswerInput> = Vec::with_capacity(answers_value.len());
    let mut seen: HashSet<i64> = HashSet::new();
    for item in answers_value {
        let Some(question_id) = item.get("questionId").and_then(|v| v.as_i64()) else {
            return err(&req.id, "bad_params", "answer missing questionId", None);
        };
        if !seen.insert(question_id) {
            return err(
                &req.id,
                "bad_params",
                format!("duplicate answer for question {}", question_id),
                None,
            );
        }
        inputs.push(AnswerInput {
            question_id,
            text: item.get("text").and_then(|v| v.as_str()).map(String::from),
            selected_option: item.get("selectedOption").and_then(|v| v.as_i64()),
            image_url: item.get("imageUrl").and_then(|v| v.as_str()).map(String::from),
        });
    }

    // Shape-check every answer against its question before writing anything.
    for input in &inputs {
        let kind_str: Option<String> = match conn
            .query_row(
                "SELECT type FROM questions WHERE id = ? AND test_id = ?",
                (input.question_id, test_id),
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let Some(kind_str) = kind_str else {
            return err(
                &req.id,
                "bad_params",
                format!("question {} is not part of this test", input.question_id),
                None,
            );
        };
        let Some(kind) = QuestionKind::parse(&kind_str) else {
            return err(&req.id, "db_query_failed", format!("corrupt question type: {}", kind_str), None);
        };
        if let Err(msg) = validate_answer_input(input, kind) {
            return err(&req.id, "bad_params", msg, None);
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for input in &inputs {
        if let Err(e) = tx.execute(
            "INSERT INTO answers(attempt_id, question_id, text, selected_option, image_url)
             VALUES(?, ?, ?, ?, ?)",
            (
                attempt_id,
                input.question_id,
                &input.text,
                input.selected_option,
                &input.image_url,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "answers" })),
            );
        }
    }
    if let Err(e) = tx.execute(
        "UPDATE test_attempts SET status = 'completed', end_time = ? WHERE id = ?",
        (now_rfc3339(), attempt_id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "attemptId": attempt_id, "status": "completed", "answerCount": inputs.len() }),
    )
}

fn handle_attempts_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let attempt_id = match required_i64(req, "attemptId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = format!(
        "SELECT {} FROM test_attempts WHERE id = ?",
        ATTEMPT_COLUMNS
    );
    let attempt = match conn.query_row(&sql, [attempt_id], attempt_json).optional() {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "attempt not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, question_id, text, selected_option, image_url, ocr_text, score, ai_confidence, ai_feedback, is_correct
         FROM answers WHERE attempt_id = ? ORDER BY question_id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let answers = stmt
        .query_map([attempt_id], answer_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match answers {
        Ok(answers) => ok(&req.id, json!({ "attempt": attempt, "answers": answers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_attempts_list_for_test(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_role(req, &[Role::Teacher, Role::Principal, Role::Admin]) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let test_id = match required_i64(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = format!(
        "SELECT {} FROM test_attempts WHERE test_id = ? ORDER BY start_time",
        ATTEMPT_COLUMNS
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([test_id], attempt_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(attempts) => ok(&req.id, json!({ "attempts": attempts })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attempts.start" => Some(handle_attempts_start(state, req)),
        "attempts.submit" => Some(handle_attempts_submit(state, req)),
        "attempts.get" => Some(handle_attempts_get(state, req)),
        "attempts.listForTest" => Some(handle_attempts_list_for_test(state, req)),
        _ => None,
    }
}
