use crate::content::validate_questions;
use crate::ipc::error::{err, ok};
use crate::ipc::params::{opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::{DocumentStore, SqliteStore};
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn handle_lessons_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let instructor_id = match required_str(&req.params, "instructorId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let title = match required_str(&req.params, "title") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store.get("users", &instructor_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "instructor not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }

    let mut fields = Map::new();
    fields.insert("instructorId".to_string(), Value::from(instructor_id));
    fields.insert("title".to_string(), Value::from(title));
    fields.insert(
        "section".to_string(),
        Value::from(opt_str(&req.params, "section")),
    );
    fields.insert(
        "content".to_string(),
        Value::from(opt_str(&req.params, "content")),
    );
    let attachment = opt_str(&req.params, "attachmentUrl");
    if !attachment.is_empty() {
        fields.insert("attachmentUrl".to_string(), Value::from(attachment));
    }
    fields.insert("createdAt".to_string(), Value::from(Utc::now().to_rfc3339()));

    let lesson_id = Uuid::new_v4().to_string();
    if let Err(e) = store.create("lessons", &lesson_id, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "lessonId": lesson_id }))
}

/// Shared create path for the two question-bearing collections; they differ
/// only in collection name.
fn handle_authored_create(state: &mut AppState, req: &Request, collection: &str) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let created_by = match required_str(&req.params, "createdBy") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let title = match required_str(&req.params, "title") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store.get("users", &created_by) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "author not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }

    let questions = match req.params.get("questions") {
        Some(raw) => match validate_questions(raw) {
            Ok(qs) => qs,
            Err(m) => return err(&req.id, "bad_questions", m, None),
        },
        None => Vec::new(),
    };

    let mut fields = Map::new();
    fields.insert("createdBy".to_string(), Value::from(created_by));
    fields.insert("title".to_string(), Value::from(title));
    fields.insert(
        "section".to_string(),
        Value::from(opt_str(&req.params, "section")),
    );
    fields.insert("questions".to_string(), Value::Array(questions));
    fields.insert("createdAt".to_string(), Value::from(Utc::now().to_rfc3339()));

    let doc_id = Uuid::new_v4().to_string();
    if let Err(e) = store.create(collection, &doc_id, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "id": doc_id }))
}

fn handle_list(state: &mut AppState, req: &Request, collection: &str, owner_field: &str) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "items": [] }));
    };
    let store = SqliteStore::new(conn);

    let mut filters: Vec<(&str, Value)> = Vec::new();
    let section = opt_str(&req.params, "section");
    if !section.is_empty() {
        filters.push(("section", Value::from(section.as_str())));
    }
    let owner = opt_str(&req.params, "ownerId");
    if !owner.is_empty() {
        filters.push((owner_field, Value::from(owner.as_str())));
    }

    let docs = match store.query(collection, &filters) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    let rows: Vec<Value> = docs
        .iter()
        .map(|d| {
            let mut row = Value::Object(d.fields.clone());
            row["id"] = Value::from(d.id.as_str());
            row
        })
        .collect();
    ok(&req.id, json!({ "items": rows }))
}

fn handle_delete(state: &mut AppState, req: &Request, collection: &str, key: &str) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let doc_id = match required_str(&req.params, key) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store.get(collection, &doc_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "document not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }
    if let Err(e) = store.delete(collection, &doc_id) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "deleted": true }))
}

/// Replaces the embedded questions array wholesale; there is no per-question
/// update primitive.
fn handle_set_questions(state: &mut AppState, req: &Request, collection: &str, key: &str) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let doc_id = match required_str(&req.params, key) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(raw) = req.params.get("questions") else {
        return err(&req.id, "bad_params", "missing questions", None);
    };
    let questions = match validate_questions(raw) {
        Ok(qs) => qs,
        Err(m) => return err(&req.id, "bad_questions", m, None),
    };

    match store.get(collection, &doc_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "document not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }

    let mut patch = Map::new();
    patch.insert("questions".to_string(), Value::Array(questions));
    if let Err(e) = store.update(collection, &doc_id, &patch) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "id": doc_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.list" => Some(handle_list(state, req, "lessons", "instructorId")),
        "lessons.delete" => Some(handle_delete(state, req, "lessons", "lessonId")),
        "activities.create" => Some(handle_authored_create(state, req, "activities")),
        "activities.list" => Some(handle_list(state, req, "activities", "createdBy")),
        "activities.delete" => Some(handle_delete(state, req, "activities", "activityId")),
        "activities.setQuestions" => {
            Some(handle_set_questions(state, req, "activities", "activityId"))
        }
        "quizzes.create" => Some(handle_authored_create(state, req, "quizzes")),
        "quizzes.list" => Some(handle_list(state, req, "quizzes", "createdBy")),
        "quizzes.delete" => Some(handle_delete(state, req, "quizzes", "quizId")),
        "quizzes.setQuestions" => Some(handle_set_questions(state, req, "quizzes", "quizId")),
        _ => None,
    }
}
