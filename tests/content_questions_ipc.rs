use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classhubd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classhubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn setup_author(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    request_ok(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "setup-author",
        "persons.create",
        json!({
            "role": "instructor",
            "name": "Pat Harper",
            "email": "pat@school.test",
            "password": "pw"
        }),
    );
    created
        .get("personId")
        .and_then(|v| v.as_str())
        .expect("personId")
        .to_string()
}

#[test]
fn quiz_questions_replace_wholesale_and_validate() {
    let workspace = temp_dir("classhub-quiz-questions");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let author = setup_author(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "quizzes.create",
        json!({
            "createdBy": &author,
            "title": "Fractions",
            "section": "A",
            "questions": [
                {
                    "question": "1/2 + 1/4?",
                    "type": "multiple-choice",
                    "points": 5,
                    "options": ["1/2", "3/4", "2/6"],
                    "correctAnswer": "3/4"
                }
            ]
        }),
    );
    let quiz_id = created
        .get("id")
        .and_then(|v| v.as_str())
        .expect("quiz id")
        .to_string();

    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "quizzes.setQuestions",
        json!({
            "quizId": &quiz_id,
            "questions": [
                { "question": "Is 1/2 > 1/3?", "type": "true-false", "points": 2, "correctAnswer": "true" },
                { "question": "Write one half as a decimal.", "type": "short-answer", "points": 3, "correctAnswer": "0.5" }
            ]
        }),
    );
    assert_eq!(replaced.get("id").and_then(|v| v.as_str()), Some(quiz_id.as_str()));

    let listed = request_ok(&mut stdin, &mut reader, "3", "quizzes.list", json!({}));
    let quiz = listed
        .get("items")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .cloned()
        .expect("quiz row");
    let questions = quiz.get("questions").and_then(|v| v.as_array()).expect("questions");
    assert_eq!(questions.len(), 2);
    assert_eq!(
        questions[0].get("type").and_then(|v| v.as_str()),
        Some("true-false")
    );

    // A bad replacement is rejected and leaves the stored array unchanged.
    let bad = request(
        &mut stdin,
        &mut reader,
        "4",
        "quizzes.setQuestions",
        json!({
            "quizId": &quiz_id,
            "questions": [
                { "question": "?", "type": "essay", "points": 1, "correctAnswer": "x" }
            ]
        }),
    );
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        bad.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_questions")
    );

    let listed = request_ok(&mut stdin, &mut reader, "5", "quizzes.list", json!({}));
    let quiz = listed
        .get("items")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .cloned()
        .expect("quiz row");
    assert_eq!(
        quiz.get("questions").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );
}

#[test]
fn multiple_choice_without_options_is_rejected_on_create() {
    let workspace = temp_dir("classhub-activity-badq");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let author = setup_author(&mut stdin, &mut reader, &workspace);

    let bad = request(
        &mut stdin,
        &mut reader,
        "1",
        "activities.create",
        json!({
            "createdBy": &author,
            "title": "Broken",
            "questions": [
                { "question": "Pick.", "type": "multiple-choice", "points": 1, "correctAnswer": "a" }
            ]
        }),
    );
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));

    let listed = request_ok(&mut stdin, &mut reader, "2", "activities.list", json!({}));
    assert_eq!(
        listed.get("items").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn match_records_history_and_ranks_the_winner() {
    let workspace = temp_dir("classhub-match");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let mut ids = Vec::new();
    for i in 0..2 {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "persons.create",
            json!({
                "role": "student",
                "name": format!("Student {}", i),
                "email": format!("student{}@school.test", i),
                "password": "pw"
            }),
        );
        ids.push(
            created
                .get("personId")
                .and_then(|v| v.as_str())
                .expect("personId")
                .to_string(),
        );
    }

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "matches.record",
        json!({
            "hostId": &ids[0],
            "opponentId": &ids[1],
            "winnerId": &ids[1],
            "game": "flashcards"
        }),
    );

    let board = request_ok(&mut stdin, &mut reader, "3", "leaderboard.get", json!({}));
    let rows = board
        .get("leaderboard")
        .and_then(|v| v.as_array())
        .expect("leaderboard rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get("name").and_then(|v| v.as_str()),
        Some("Student 1")
    );
    assert_eq!(rows[0].get("rankPoints").and_then(|v| v.as_i64()), Some(25));
    assert_eq!(rows[0].get("coins").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(rows[1].get("rankPoints").and_then(|v| v.as_i64()), Some(0));

    let rejected = request(
        &mut stdin,
        &mut reader,
        "4",
        "matches.record",
        json!({ "hostId": &ids[0], "opponentId": &ids[0], "winnerId": &ids[0] }),
    );
    assert_eq!(rejected.get("ok").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn submissions_attach_to_activities_and_students() {
    let workspace = temp_dir("classhub-submissions");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let author = setup_author(&mut stdin, &mut reader, &workspace);

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "persons.create",
        json!({
            "role": "student",
            "name": "Sam Rivera",
            "email": "sam@school.test",
            "password": "pw"
        }),
    );
    let student_id = student
        .get("personId")
        .and_then(|v| v.as_str())
        .expect("personId")
        .to_string();

    let activity = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "activities.create",
        json!({ "createdBy": &author, "title": "Drill" }),
    );
    let activity_id = activity
        .get("id")
        .and_then(|v| v.as_str())
        .expect("activity id")
        .to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.create",
        json!({
            "studentId": &student_id,
            "activityId": &activity_id,
            "answers": ["0.5"],
            "score": 3
        }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.list",
        json!({ "activityId": &activity_id }),
    );
    let rows = listed
        .get("submissions")
        .and_then(|v| v.as_array())
        .expect("submissions");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("score").and_then(|v| v.as_i64()), Some(3));

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "submissions.create",
        json!({ "studentId": &student_id, "activityId": "missing-activity" }),
    );
    assert_eq!(missing.get("ok").and_then(|v| v.as_bool()), Some(false));
}
