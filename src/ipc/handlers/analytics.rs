use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;

use crate::ai::{AnswerResult, StudentResult};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_rfc3339, required_i64, required_str, require_actor, require_role};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;

fn analytics_json(row: &Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let user_id: i64 = row.get(1)?;
    let test_id: i64 = row.get(2)?;
    let weak: String = row.get(3)?;
    let strong: String = row.get(4)?;
    let resources: String = row.get(5)?;
    let insight_date: String = row.get(6)?;
    Ok(json!({
        "id": id,
        "userId": user_id,
        "testId": test_id,
        "weakTopics": serde_json::from_str::<serde_json::Value>(&weak).unwrap_or(json!([])),
        "strongTopics": serde_json::from_str::<serde_json::Value>(&strong).unwrap_or(json!([])),
        "recommendedResources": serde_json::from_str::<serde_json::Value>(&resources).unwrap_or(json!([])),
        "insightDate": insight_date,
    }))
}

fn str_vec(req: &Request, key: &str) -> Vec<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Per-question score ratios of the latest evaluated attempt, split into
/// weak (< 50%) and strong (>= 80%) topic lists keyed by question text.
fn derive_topics(
    conn: &Connection,
    attempt_id: i64,
) -> rusqlite::Result<(Vec<String>, Vec<String>)> {
    let mut stmt = conn.prepare(
        "SELECT q.text, q.marks, a.score
         FROM answers a
         JOIN questions q ON q.id = a.question_id
         WHERE a.attempt_id = ?
         ORDER BY q.ord",
    )?;
    let rows = stmt.query_map([attempt_id], |r| {
        let text: String = r.get(0)?;
        let marks: i64 = r.get(1)?;
        let score: Option<f64> = r.get(2)?;
        Ok((text, marks, score))
    })?;

    let mut weak = Vec::new();
    let mut strong = Vec::new();
    for row in rows {
        let (text, marks, score) = row?;
        if marks <= 0 {
            continue;
        }
        let ratio = score.unwrap_or(0.0) / marks as f64;
        if ratio < 0.5 {
            weak.push(text);
        } else if ratio >= 0.8 {
            strong.push(text);
        }
    }
    Ok((weak, strong))
}

fn handle_analytics_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_role(req, &[Role::Teacher, Role::Admin]) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_id = match required_i64(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let subject: Option<String> = match conn
        .query_row("SELECT subject FROM tests WHERE id = ?", [test_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(subject) = subject else {
        return err(&req.id, "not_found", "test not found", None);
    };

    let attempt_id: Option<i64> = match conn
        .query_row(
            "SELECT id FROM test_attempts
             WHERE test_id = ? AND student_id = ? AND status = 'evaluated'
             ORDER BY id DESC LIMIT 1",
            (test_id, user_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(attempt_id) = attempt_id else {
        return err(&req.id, "conflict", "no evaluated attempt for this user and test", None);
    };

    let (weak, strong) = match derive_topics(conn, attempt_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // The resource list comes from the study-plan operation; its own
    // fallback keeps this handler from ever failing on an AI outage.
    let plan = state.ai.generate_study_plan(&weak, &strong, &subject);
    let resources_json = serde_json::to_string(&plan.resources)
        .unwrap_or_else(|_| "[]".to_string());
    let weak_json = serde_json::to_string(&weak).unwrap_or_else(|_| "[]".to_string());
    let strong_json = serde_json::to_string(&strong).unwrap_or_else(|_| "[]".to_string());

    // Later runs supersede earlier ones.
    if let Err(e) = conn.execute(
        "INSERT INTO analytics(user_id, test_id, weak_topics, strong_topics, recommended_resources, insight_date)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id, test_id) DO UPDATE SET
           weak_topics = excluded.weak_topics,
           strong_topics = excluded.strong_topics,
           recommended_resources = excluded.recommended_resources,
           insight_date = excluded.insight_date",
        (
            user_id,
            test_id,
            &weak_json,
            &strong_json,
            &resources_json,
            now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "analytics" })),
        );
    }

    ok(
        &req.id,
        json!({
            "userId": user_id,
            "testId": test_id,
            "weakTopics": weak,
            "strongTopics": strong,
            "recommendedResources": plan.resources,
            "plan": plan.plan,
        }),
    )
}

fn handle_analytics_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let test_id = match required_i64(req, "testId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn
        .query_row(
            "SELECT id, user_id, test_id, weak_topics, strong_topics, recommended_resources, insight_date
             FROM analytics WHERE user_id = ? AND test_id = ?",
            (user_id, test_id),
            analytics_json,
        )
        .optional()
    {
        Ok(Some(row)) => ok(&req.id, json!({ "analytics": row })),
        Ok(None) => err(&req.id, "not_found", "no analytics for this user and test", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_analytics_study_plan(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_actor(req) {
        return e;
    }
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weak = str_vec(req, "weakTopics");
    let strong = str_vec(req, "strongTopics");

    let plan = state.ai.generate_study_plan(&weak, &strong, &subject);
    ok(
        &req.id,
        json!({ "plan": plan.plan, "resources": plan.resources }),
    )
}

fn handle_tests_performance(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_role(req, &[Role::Teacher, Role::Principal]) {
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

    let mut stmt = match conn.prepare(
        "SELECT id, student_id, score FROM test_attempts
         WHERE test_id = ? AND status = 'evaluated'
         ORDER BY id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let attempts = stmt
        .query_map([test_id], |r| {
            let id: i64 = r.get(0)?;
            let student_id: i64 = r.get(1)?;
            let score: Option<f64> = r.get(2)?;
            Ok((id, student_id, score.unwrap_or(0.0)))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let attempts = match attempts {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut results: Vec<StudentResult> = Vec::with_capacity(attempts.len());
    for (attempt_id, student_id, score) in attempts {
        let mut stmt = match conn.prepare(
            "SELECT a.question_id, a.score, q.text
             FROM answers a
             JOIN questions q ON q.id = a.question_id
             WHERE a.attempt_id = ?
             ORDER BY q.ord",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let answers = stmt
            .query_map([attempt_id], |r| {
                let question_id: i64 = r.get(0)?;
                let score: Option<f64> = r.get(1)?;
                let question: String = r.get(2)?;
                Ok(AnswerResult {
                    question_id,
                    score: score.unwrap_or(0.0),
                    question,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let answers = match answers {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        results.push(StudentResult {
            student_id,
            score,
            answers,
        });
    }

    let insights = state.ai.analyze_test_performance(&results);
    ok(
        &req.id,
        json!({
            "testId": test_id,
            "evaluatedAttempts": results.len(),
            "averageScore": insights.average_score,
            "hardestQuestions": insights.hardest_questions,
            "recommendations": insights.recommendations,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.generate" => Some(handle_analytics_generate(state, req)),
        "analytics.get" => Some(handle_analytics_get(state, req)),
        "analytics.studyPlan" => Some(handle_analytics_study_plan(state, req)),
        "tests.performance" => Some(handle_tests_performance(state, req)),
        _ => None,
    }
}
