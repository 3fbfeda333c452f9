use crate::import::valid_section_name;
use crate::ipc::error::{err, ok};
use crate::ipc::params::required_str;
use crate::ipc::types::{AppState, Request};
use crate::roster;
use crate::store::{DocumentStore, SqliteStore};
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn handle_sections_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sections": [] }));
    };
    let store = SqliteStore::new(conn);

    let mut sections = match store.query("classes", &[]) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    sections.sort_by(|a, b| a.str_field("sectionName").cmp(b.str_field("sectionName")));

    let rows: Vec<Value> = sections
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "sectionName": s.str_field("sectionName"),
                "studentCount": s.i64_field("studentCount"),
                "instructor": s.str_field("instructor")
            })
        })
        .collect();
    ok(&req.id, json!({ "sections": rows }))
}

fn handle_sections_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !valid_section_name(&name) {
        return err(
            &req.id,
            "bad_params",
            "section names may use letters, digits, spaces and hyphens only",
            None,
        );
    }

    match roster::find_section_by_name(&store, &name) {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "already_exists",
                format!("section already exists: {}", name),
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }

    let section_id = Uuid::new_v4().to_string();
    let mut fields = Map::new();
    fields.insert("sectionName".to_string(), Value::from(name.as_str()));
    fields.insert("studentCount".to_string(), Value::from(0));
    fields.insert("instructor".to_string(), Value::from(""));
    fields.insert("createdAt".to_string(), Value::from(Utc::now().to_rfc3339()));
    if let Err(e) = store.create("classes", &section_id, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "sectionId": section_id, "sectionName": name }))
}

fn handle_sections_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let section_id = match required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let section = match store.get("classes", &section_id) {
        Ok(Some(doc)) => doc,
        Ok(None) => return err(&req.id, "not_found", "section not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    let name = section.str_field("sectionName").to_string();

    // Members must be unassigned before the section record disappears;
    // the denormalized count dies with the record.
    let members = match store.query("users", &[("section", Value::from(name.as_str()))]) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    let mut unassigned = 0usize;
    for member in &members {
        let mut patch = Map::new();
        patch.insert("section".to_string(), Value::from(""));
        if let Err(e) = store.update("users", &member.id, &patch) {
            return err(
                &req.id,
                "store_write_failed",
                e.to_string(),
                Some(json!({ "personId": member.id })),
            );
        }
        unassigned += 1;
    }

    if let Err(e) = store.delete("classes", &section_id) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "sectionName": name, "unassigned": unassigned }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "sections.list" => Some(handle_sections_list(state, req)),
        "sections.create" => Some(handle_sections_create(state, req)),
        "sections.delete" => Some(handle_sections_delete(state, req)),
        _ => None,
    }
}
