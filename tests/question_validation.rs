
use serde_json::{json, Value};
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{rpc_err, rpc_ok, spawn_sidecar, temp_dir};

fn setup_draft_test(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> (Value, i64) {
    let workspace = temp_dir(prefix);
    let _ = rpc_ok(
        stdin,
        reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );
    let teacher_id = rpc_ok(
        stdin,
        reader,
        "users.register",
        json!({
            "username": format!("t.{}", prefix),
            "password": "pw",
            "name": "Teacher",
            "email": format!("t.{}@school.test", prefix),
            "role": "teacher"
        }),
        None,
    )["userId"]
        .as_i64()
        .expect("userId");
    let teacher = json!({ "userId": teacher_id, "role": "teacher" });
    let test_id = rpc_ok(
        stdin,
        reader,
        "tests.create",
        json!({ "title": "Paper", "subject": "Chemistry", "class": "Grade 12-A" }),
        Some(teacher.clone()),
    )["testId"]
        .as_i64()
        .expect("testId");
    (teacher, test_id)
}

#[test]
fn mcq_shape_is_validated_at_the_boundary() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (teacher, test_id) = setup_draft_test(&mut stdin, &mut reader, "qv-mcq");

    // Fewer than two options.
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "mcq", "text": "Pick one", "order": 1,
            "options": [{ "text": "only", "isCorrect": true }]
        }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    // No correct option.
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "mcq", "text": "Pick one", "order": 1,
            "options": [{ "text": "a" }, { "text": "b" }]
        }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    // Two correct options.
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "mcq", "text": "Pick one", "order": 1,
            "options": [
                { "text": "a", "isCorrect": true },
                { "text": "b", "isCorrect": true }
            ]
        }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    // A valid one stores the correct index as the answer key.
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "mcq", "text": "Pick one", "order": 1,
            "options": [{ "text": "a" }, { "text": "b", "isCorrect": true }]
        }),
        Some(teacher.clone()),
    );
    let questions = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.list",
        json!({ "testId": test_id }),
        Some(teacher.clone()),
    );
    assert_eq!(questions["questions"][0]["correctAnswer"], "1");

    let _ = child.kill();
}

#[test]
fn numerical_requires_a_numeric_answer_key() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (teacher, test_id) = setup_draft_test(&mut stdin, &mut reader, "qv-num");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({ "testId": test_id, "type": "numerical", "text": "2+2?", "order": 1 }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "numerical", "text": "2+2?",
            "order": 1, "correctAnswer": "four"
        }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "numerical", "text": "2+2?",
            "order": 1, "correctAnswer": "4", "tolerance": -0.5
        }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    let _ = child.kill();
}

#[test]
fn question_order_is_unique_per_test() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (teacher, test_id) = setup_draft_test(&mut stdin, &mut reader, "qv-order");

    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "short", "text": "Define osmosis.",
            "order": 1
        }),
        Some(teacher.clone()),
    );
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "short", "text": "Define diffusion.",
            "order": 1
        }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "conflict");

    let _ = child.kill();
}

#[test]
fn published_tests_are_frozen() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (teacher, test_id) = setup_draft_test(&mut stdin, &mut reader, "qv-frozen");

    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({ "testId": test_id, "type": "short", "text": "Q1", "order": 1 }),
        Some(teacher.clone()),
    );
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.publish",
        json!({ "testId": test_id }),
        Some(teacher.clone()),
    );

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({ "testId": test_id, "type": "short", "text": "Q2", "order": 2 }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "conflict");

    let _ = child.kill();
}

#[test]
fn unknown_question_type_is_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (teacher, test_id) = setup_draft_test(&mut stdin, &mut reader, "qv-type");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({ "testId": test_id, "type": "essay", "text": "Write.", "order": 1 }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "bad_params");

    let _ = child.kill();
}
