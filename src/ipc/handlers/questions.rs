use rusqlite::{OptionalExtension, Row};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, optional_f64, optional_i64, optional_str, required_i64, required_str, require_role,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{QuestionKind, Role, TestStatus};

pub(crate) fn question_json(row: &Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let test_id: i64 = row.get(1)?;
    let kind: String = row.get(2)?;
    let text: String = row.get(3)?;
    let options: Option<String> = row.get(4)?;
    let correct_answer: Option<String> = row.get(5)?;
    let marks: i64 = row.get(6)?;
    let ord: i64 = row.get(7)?;
    let ai_rubric: Option<String> = row.get(8)?;
    let tolerance: Option<f64> = row.get(9)?;
    let options_value = options
        .as_deref()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
        .unwrap_or(serde_json::Value::Null);
    Ok(json!({
        "id": id,
        "testId": test_id,
        "type": kind,
        "text": text,
        "options": options_value,
        "correctAnswer": correct_answer,
        "marks": marks,
        "order": ord,
        "aiRubric": ai_rubric,
        "tolerance": tolerance,
    }))
}

/// The answer key is only for the owning teacher and admins; everyone
/// else gets the question with `correctAnswer` and the per-option
/// `isCorrect` flags stripped.
pub(crate) fn can_view_answer_key(req: &Request, teacher_id: i64) -> bool {
    match &req.actor {
        Some(actor) => {
            actor.role == Role::Admin
                || (actor.role == Role::Teacher && actor.user_id == teacher_id)
        }
        None => false,
    }
}

pub(crate) fn redact_answer_key(question: &mut serde_json::Value) {
    if let Some(obj) = question.as_object_mut() {
        obj.remove("correctAnswer");
    }
    if let Some(options) = question
        .get_mut("options")
        .and_then(|v| v.as_array_mut())
    {
        for option in options {
            if let Some(obj) = option.as_object_mut() {
                obj.remove("isCorrect");
            }
        }
    }
}

struct OptionSpec {
    text: String,
    is_correct: bool,
}

fn parse_options(value: &serde_json::Value) -> Result<Vec<OptionSpec>, String> {
    let Some(items) = value.as_array() else {
        return Err("options must be an array".to_string());
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(text) = item.get("text").and_then(|v| v.as_str()) else {
            return Err("each option needs a text field".to_string());
        };
        let is_correct = item
            .get("isCorrect")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        out.push(OptionSpec {
            text: text.to_string(),
            is_correct,
        });
    }
    Ok(out)
}

fn handle_questions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_role(req, &[Role::Teacher]) {
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

    let row: Option<(i64, String)> = match conn
        .query_row(
            "SELECT teacher_id, status FROM tests WHERE id = ?",
            [test_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((teacher_id, status)) = row else {
        return err(&req.id, "not_found", "test not found", None);
    };
    if teacher_id != actor.user_id {
        return err(&req.id, "forbidden", "only the owning teacher may add questions", None);
    }
    // Questions exist only on draft tests; a published paper is frozen.
    if TestStatus::parse(&status) != Some(TestStatus::Draft) {
        return err(&req.id, "conflict", "questions can only be added to a draft test", None);
    }

    let kind_str = match required_str(req, "type") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(kind) = QuestionKind::parse(&kind_str) else {
        return err(&req.id, "bad_params", format!("unknown question type: {}", kind_str), None);
    };
    let text = match required_str(req, "text") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ord = match required_i64(req, "order") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let marks = optional_i64(req, "marks").unwrap_or(1);
    if marks <= 0 {
        return err(&req.id, "bad_params", "marks must be positive", None);
    }
    let ai_rubric = optional_str(req, "aiRubric");
    let tolerance = optional_f64(req, "tolerance");
    if tolerance.map(|t| t < 0.0).unwrap_or(false) {
        return err(&req.id, "bad_params", "tolerance must not be negative", None);
    }

    let mut options_json: Option<String> = None;
    let mut correct_answer: Option<String> = None;
    match kind {
        QuestionKind::Mcq => {
            let Some(options_value) = req.params.get("options") else {
                return err(&req.id, "bad_params", "mcq requires options", None);
            };
            let options = match parse_options(options_value) {
                Ok(v) => v,
                Err(msg) => return err(&req.id, "bad_params", msg, None),
            };
            if options.len() < 2 {
                return err(&req.id, "bad_params", "mcq requires at least 2 options", None);
            }
            let correct: Vec<usize> = options
                .iter()
                .enumerate()
                .filter(|(_, o)| o.is_correct)
                .map(|(i, _)| i)
                .collect();
            if correct.len() != 1 {
                return err(
                    &req.id,
                    "bad_params",
                    "mcq requires exactly one correct option",
                    None,
                );
            }
            let texts: Vec<serde_json::Value> = options
                .iter()
                .map(|o| json!({ "text": o.text, "isCorrect": o.is_correct }))
                .collect();
            options_json = serde_json::to_string(&texts).ok();
            correct_answer = Some(correct[0].to_string());
        }
        QuestionKind::Numerical => {
            let Some(answer) = optional_str(req, "correctAnswer") else {
                return err(&req.id, "bad_params", "numerical requires correctAnswer", None);
            };
            if answer.trim().parse::<f64>().is_err() {
                return err(&req.id, "bad_params", "correctAnswer must be numeric", None);
            }
            correct_answer = Some(answer);
        }
        QuestionKind::Short | QuestionKind::Long => {}
    }

    let ord_taken: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM questions WHERE test_id = ? AND ord = ?",
            (test_id, ord),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if ord_taken.is_some() {
        return err(&req.id, "conflict", "question order already used in this test", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO questions(test_id, type, text, options, correct_answer, marks, ord, ai_rubric, tolerance)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            test_id,
            kind.as_str(),
            &text,
            &options_json,
            &correct_answer,
            marks,
            ord,
            &ai_rubric,
            tolerance,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "questions" })),
        );
    }

    ok(
        &req.id,
        json!({ "questionId": conn.last_insert_rowid(), "testId": test_id, "order": ord }),
    )
}

fn handle_questions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let test_id = match required_i64(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let teacher_id: Option<i64> = match conn
        .query_row("SELECT teacher_id FROM tests WHERE id = ?", [test_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(teacher_id) = teacher_id else {
        return err(&req.id, "not_found", "test not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT id, test_id, type, text, options, correct_answer, marks, ord, ai_rubric, tolerance
         FROM questions WHERE test_id = ? ORDER BY ord",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([test_id], question_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(mut questions) => {
            if !can_view_answer_key(req, teacher_id) {
                for question in &mut questions {
                    redact_answer_key(question);
                }
            }
            ok(&req.id, json!({ "questions": questions }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "questions.create" => Some(handle_questions_create(state, req)),
        "questions.list" => Some(handle_questions_list(state, req)),
        _ => None,
    }
}
