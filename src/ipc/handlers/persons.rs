use crate::auth::{AuthDirectory, SqliteAuth};
use crate::import::new_person_fields;
use crate::ipc::error::{err, ok};
use crate::ipc::params::{opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, ROLE_INSTRUCTOR, ROLE_STUDENT};
use crate::store::{Document, DocumentStore, SqliteStore};
use serde_json::{json, Map, Value};

const ROLES: &[&str] = &["admin", "instructor", "student"];

// Fields an admin may edit in place. Email is excluded: it is the auth
// directory's key and cannot be changed from the store side.
const UPDATABLE_FIELDS: &[&str] = &["name", "hearts", "coins", "rankPoints"];

fn person_row(doc: &Document) -> Value {
    let mut row = json!({
        "id": doc.id,
        "role": doc.str_field("role"),
        "name": doc.str_field("name"),
        "email": doc.str_field("email"),
        "section": doc.str_field("section")
    });
    if doc.str_field("role") == ROLE_STUDENT {
        row["hearts"] = Value::from(doc.i64_field("hearts"));
        row["coins"] = Value::from(doc.i64_field("coins"));
        row["rankPoints"] = Value::from(doc.i64_field("rankPoints"));
    }
    row
}

fn handle_persons_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let auth = SqliteAuth::new(conn);

    let role = match required_str(&req.params, "role") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e.response(&req.id),
    };
    if !ROLES.contains(&role.as_str()) {
        return err(&req.id, "bad_params", format!("unknown role: {}", role), None);
    }
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let email = match required_str(&req.params, "email") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let password = match required_str(&req.params, "password") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let section = opt_str(&req.params, "section");

    if !section.is_empty() {
        let existing = match roster::find_section_by_name(&store, &section) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
        };
        let Some(existing) = existing else {
            return err(
                &req.id,
                "not_found",
                format!("section not found: {}", section),
                None,
            );
        };
        let claimed = existing.str_field("instructor");
        if role == ROLE_INSTRUCTOR && !claimed.is_empty() && claimed != name {
            return err(
                &req.id,
                "section_taken",
                format!("section {} already has instructor {}", section, claimed),
                None,
            );
        }
    }

    let uid = match auth.create_account(&email, &password) {
        Ok(uid) => uid,
        Err(e) => return err(&req.id, "auth_create_failed", e.to_string(), None),
    };
    let fields = new_person_fields(&role, &name, &email, &section);
    if let Err(e) = store.create("users", &uid, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    if let Err(e) = roster::apply_destination_for_new_person(&store, &role, &section, &name) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "personId": uid }))
}

fn handle_persons_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let person_id = match required_str(&req.params, "personId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(fields) = req.params.get("fields").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing fields object", None);
    };

    let mut patch = Map::new();
    for (k, v) in fields {
        if !UPDATABLE_FIELDS.contains(&k.as_str()) {
            return err(
                &req.id,
                "bad_params",
                format!("field not updatable: {}", k),
                None,
            );
        }
        patch.insert(k.clone(), v.clone());
    }
    if patch.is_empty() {
        return err(&req.id, "bad_params", "no updatable fields given", None);
    }

    match store.get("users", &person_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "person not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }
    if let Err(e) = store.update("users", &person_id, &patch) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "personId": person_id }))
}

fn handle_list_by_role(state: &mut AppState, req: &Request, role: &str) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "persons": [] }));
    };
    let store = SqliteStore::new(conn);

    let mut filters: Vec<(&str, Value)> = vec![("role", Value::from(role))];
    let section = opt_str(&req.params, "section");
    if !section.is_empty() {
        filters.push(("section", Value::from(section.as_str())));
    }

    let mut persons = match store.query("users", &filters) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    persons.sort_by(|a, b| a.str_field("name").cmp(b.str_field("name")));

    let rows: Vec<Value> = persons.iter().map(person_row).collect();
    ok(&req.id, json!({ "persons": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "persons.create" => Some(handle_persons_create(state, req)),
        "persons.update" => Some(handle_persons_update(state, req)),
        "instructors.list" => Some(handle_list_by_role(state, req, ROLE_INSTRUCTOR)),
        "students.list" => Some(handle_list_by_role(state, req, ROLE_STUDENT)),
        _ => None,
    }
}
