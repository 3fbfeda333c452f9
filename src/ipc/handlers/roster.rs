use crate::auth::SqliteAuth;
use crate::ipc::error::{err, ok};
use crate::ipc::params::{opt_str, required_id_list};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use crate::store::SqliteStore;
use serde_json::{json, Value};

fn handle_reassign_section(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let person_ids = match required_id_list(&req.params, "personIds") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let target = opt_str(&req.params, "targetSection");

    match roster::reassign_section(&store, &person_ids, &target) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "updated": outcome.updated,
                "failed": roster::item_errors_json(&outcome.failed)
            }),
        ),
        Err(e) => err(&req.id, "reassign_failed", e.to_string(), None),
    }
}

fn handle_delete_persons(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let auth = SqliteAuth::new(conn);

    let person_ids = match required_id_list(&req.params, "personIds") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match roster::delete_persons(&store, &auth, &person_ids) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "deleted": outcome.deleted,
                "failed": roster::item_errors_json(&outcome.failed),
                "authWarnings": outcome.auth_warnings
            }),
        ),
        Err(e) => err(&req.id, "delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "roster.reassignSection" => Some(handle_reassign_section(state, req)),
        "roster.deletePersons" => Some(handle_delete_persons(state, req)),
        _ => None,
    }
}
