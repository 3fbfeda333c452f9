use serde_json::{Map, Value};

/// Collections whose documents belong to a person, keyed by the field holding
/// the owner id. Cascade deletion walks this list; adding a new owned-content
/// type is one entry here. `matches` is listed once per participant field so a
/// match dies with either player.
pub const OWNED_COLLECTIONS: &[(&str, &str)] = &[
    ("lessons", "instructorId"),
    ("activities", "createdBy"),
    ("quizzes", "createdBy"),
    ("posts", "userId"),
    ("submissions", "studentId"),
    ("matches", "hostId"),
    ("matches", "opponentId"),
    ("matchHistory", "userId"),
];

pub const QUESTION_TYPES: &[&str] = &["multiple-choice", "true-false", "short-answer"];

/// Validates a replacement `questions` array for an activity or quiz. The
/// embedded array is the only mutation unit, so the whole payload must be
/// well-formed before anything is written.
pub fn validate_questions(raw: &Value) -> Result<Vec<Value>, String> {
    let Some(items) = raw.as_array() else {
        return Err("questions must be an array".to_string());
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            return Err(format!("question {} must be an object", i + 1));
        };

        let text = obj.get("question").and_then(|v| v.as_str()).unwrap_or("");
        if text.trim().is_empty() {
            return Err(format!("question {} is missing question text", i + 1));
        }

        let qtype = obj.get("type").and_then(|v| v.as_str()).unwrap_or("");
        if !QUESTION_TYPES.contains(&qtype) {
            return Err(format!("question {} has unknown type: {}", i + 1, qtype));
        }

        let points = obj.get("points").and_then(|v| v.as_f64());
        if points.map(|p| p < 0.0).unwrap_or(true) {
            return Err(format!("question {} needs a non-negative points value", i + 1));
        }

        if obj
            .get("correctAnswer")
            .map(|v| v.is_null())
            .unwrap_or(true)
        {
            return Err(format!("question {} is missing correctAnswer", i + 1));
        }

        if qtype == "multiple-choice" {
            let options = obj.get("options").and_then(|v| v.as_array());
            match options {
                Some(opts) if opts.len() >= 2 => {}
                _ => {
                    return Err(format!(
                        "question {} needs at least two options",
                        i + 1
                    ))
                }
            }
        }

        let mut clean = Map::new();
        for key in ["question", "type", "points", "options", "correctAnswer"] {
            if let Some(v) = obj.get(key) {
                clean.insert(key.to_string(), v.clone());
            }
        }
        out.push(Value::Object(clean));
    }
    Ok(out)
}
