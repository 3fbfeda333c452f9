use crate::auth::SqliteAuth;
use crate::import::{self, ImportKind};
use crate::ipc::error::{err, ok};
use crate::ipc::params::{opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::{json, Value};

fn parse_delimiter(params: &Value) -> Result<char, String> {
    let raw = opt_str(params, "delimiter");
    if raw.is_empty() {
        return Ok(',');
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("delimiter must be a single character, got: {}", raw)),
    }
}

fn handle_import(state: &mut AppState, req: &Request, kind: ImportKind) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let auth = SqliteAuth::new(conn);

    let text = match req.params.get("text").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing text", None),
    };
    let delimiter = match parse_delimiter(&req.params) {
        Ok(c) => c,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match import::run_import(&store, &auth, kind, &text, delimiter) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "total": summary.total,
                "created": summary.created,
                "failed": summary.failed_json()
            }),
        ),
        Err(e) => err(&req.id, "import_failed", e.to_string(), None),
    }
}

fn handle_template(req: &Request) -> Value {
    let kind_raw = match required_str(&req.params, "kind") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(kind) = ImportKind::parse(&kind_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("kind must be students or instructors, got: {}", kind_raw),
            None,
        );
    };
    ok(
        &req.id,
        json!({ "kind": kind_raw, "template": import::template(kind) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "roster.importStudents" => Some(handle_import(state, req, ImportKind::Students)),
        "roster.importInstructors" => Some(handle_import(state, req, ImportKind::Instructors)),
        "roster.importTemplate" => Some(handle_template(req)),
        _ => None,
    }
}
