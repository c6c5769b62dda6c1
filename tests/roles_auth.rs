
use serde_json::json;
use test_support::{register, rpc_err, rpc_ok, spawn_sidecar, temp_dir};

#[test]
fn mutating_methods_require_an_actor_with_the_right_role() {
    let workspace = temp_dir("assessd-roles");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let teacher_id = register(&mut stdin, &mut reader, "t.roles", "teacher");
    let student_id = register(&mut stdin, &mut reader, "s.roles", "student");
    let teacher = json!({ "userId": teacher_id, "role": "teacher" });
    let student = json!({ "userId": student_id, "role": "student" });

    // No actor at all.
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "tests.create",
        json!({ "title": "X", "subject": "Maths", "class": "Grade 7-A" }),
        None,
    );
    assert_eq!(code, "not_authenticated");

    // A student cannot author tests.
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "tests.create",
        json!({ "title": "X", "subject": "Maths", "class": "Grade 7-A" }),
        Some(student.clone()),
    );
    assert_eq!(code, "forbidden");

    // A teacher cannot sit an attempt.
    let test_id = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.create",
        json!({ "title": "X", "subject": "Maths", "class": "Grade 7-A" }),
        Some(teacher.clone()),
    )["testId"]
        .as_i64()
        .expect("testId");
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
        "attempts.start",
        json!({ "testId": test_id }),
        Some(teacher.clone()),
    );
    assert_eq!(code, "forbidden");

    // A student cannot browse the user directory.
    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "users.list",
        json!({}),
        Some(student.clone()),
    );
    assert_eq!(code, "forbidden");

    let _ = child.kill();
}

#[test]
fn only_the_owning_teacher_may_change_a_test() {
    let workspace = temp_dir("assessd-ownership");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let owner_id = register(&mut stdin, &mut reader, "t.owner", "teacher");
    let other_id = register(&mut stdin, &mut reader, "t.other", "teacher");
    let owner = json!({ "userId": owner_id, "role": "teacher" });
    let other = json!({ "userId": other_id, "role": "teacher" });

    let test_id = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.create",
        json!({ "title": "Owned", "subject": "Art", "class": "Grade 6-A" }),
        Some(owner.clone()),
    )["testId"]
        .as_i64()
        .expect("testId");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "tests.publish",
        json!({ "testId": test_id }),
        Some(other.clone()),
    );
    assert_eq!(code, "forbidden");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({ "testId": test_id, "type": "short", "text": "Q", "order": 1 }),
        Some(other.clone()),
    );
    assert_eq!(code, "forbidden");

    // The owner still can.
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.publish",
        json!({ "testId": test_id }),
        Some(owner.clone()),
    );

    let _ = child.kill();
}

#[test]
fn student_cannot_submit_someone_elses_attempt() {
    let workspace = temp_dir("assessd-attempt-owner");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let teacher_id = register(&mut stdin, &mut reader, "t.sub", "teacher");
    let alice_id = register(&mut stdin, &mut reader, "s.alice", "student");
    let bob_id = register(&mut stdin, &mut reader, "s.bob", "student");
    let teacher = json!({ "userId": teacher_id, "role": "teacher" });
    let alice = json!({ "userId": alice_id, "role": "student" });
    let bob = json!({ "userId": bob_id, "role": "student" });

    let test_id = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.create",
        json!({ "title": "Ownership", "subject": "Maths", "class": "Grade 7-B" }),
        Some(teacher.clone()),
    )["testId"]
        .as_i64()
        .expect("testId");
    let q1 = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "numerical", "text": "1+2?",
            "marks": 1, "order": 1, "correctAnswer": "3"
        }),
        Some(teacher.clone()),
    )["questionId"]
        .as_i64()
        .expect("questionId");
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.publish",
        json!({ "testId": test_id }),
        Some(teacher.clone()),
    );

    let attempt_id = rpc_ok(
        &mut stdin,
        &mut reader,
        "attempts.start",
        json!({ "testId": test_id }),
        Some(alice.clone()),
    )["attemptId"]
        .as_i64()
        .expect("attemptId");

    let code = rpc_err(
        &mut stdin,
        &mut reader,
        "attempts.submit",
        json!({
            "attemptId": attempt_id,
            "answers": [{ "questionId": q1, "text": "3" }]
        }),
        Some(bob.clone()),
    );
    assert_eq!(code, "forbidden");

    let _ = child.kill();
}

#[test]
fn answer_key_is_hidden_from_students() {
    let workspace = temp_dir("assessd-answer-key");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
        None,
    );

    let teacher_id = register(&mut stdin, &mut reader, "t.key", "teacher");
    let student_id = register(&mut stdin, &mut reader, "s.key", "student");
    let teacher = json!({ "userId": teacher_id, "role": "teacher" });
    let student = json!({ "userId": student_id, "role": "student" });

    let test_id = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.create",
        json!({ "title": "Keyed", "subject": "Maths", "class": "Grade 9-A" }),
        Some(teacher.clone()),
    )["testId"]
        .as_i64()
        .expect("testId");
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "mcq", "text": "Pick", "marks": 2, "order": 1,
            "options": [{ "text": "a" }, { "text": "b", "isCorrect": true }]
        }),
        Some(teacher.clone()),
    );
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.create",
        json!({
            "testId": test_id, "type": "numerical", "text": "2+3?",
            "marks": 1, "order": 2, "correctAnswer": "5"
        }),
        Some(teacher.clone()),
    );
    let _ = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.publish",
        json!({ "testId": test_id }),
        Some(teacher.clone()),
    );

    // Students get the questions with the key stripped.
    let listed = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.list",
        json!({ "testId": test_id }),
        Some(student.clone()),
    );
    for question in listed["questions"].as_array().expect("questions") {
        assert!(question.get("correctAnswer").is_none(), "key leaked: {}", question);
        if let Some(options) = question.get("options").and_then(|v| v.as_array()) {
            for option in options {
                assert!(option.get("isCorrect").is_none(), "key leaked: {}", option);
            }
        }
    }
    let fetched = rpc_ok(
        &mut stdin,
        &mut reader,
        "tests.get",
        json!({ "testId": test_id }),
        Some(student.clone()),
    );
    for question in fetched["questions"].as_array().expect("questions") {
        assert!(question.get("correctAnswer").is_none(), "key leaked: {}", question);
    }

    // The owning teacher still sees it.
    let listed = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.list",
        json!({ "testId": test_id }),
        Some(teacher.clone()),
    );
    assert_eq!(listed["questions"][0]["options"][1]["isCorrect"], true);
    assert_eq!(listed["questions"][1]["correctAnswer"], "5");

    // Another teacher does not.
    let other_id = register(&mut stdin, &mut reader, "t.keyother", "teacher");
    let other = json!({ "userId": other_id, "role": "teacher" });
    let listed = rpc_ok(
        &mut stdin,
        &mut reader,
        "questions.list",
        json!({ "testId": test_id }),
        Some(other),
    );
    assert!(listed["questions"][1].get("correctAnswer").is_none());

    let _ = child.kill();
}
