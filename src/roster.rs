use crate::auth::AuthDirectory;
use crate::content::OWNED_COLLECTIONS;
use crate::store::{Document, DocumentStore};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const ROLE_INSTRUCTOR: &str = "instructor";
pub const ROLE_STUDENT: &str = "student";

#[derive(Debug)]
pub struct ItemError {
    pub id: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ReassignOutcome {
    pub updated: usize,
    pub failed: Vec<ItemError>,
}

#[derive(Debug)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub failed: Vec<ItemError>,
    pub auth_warnings: Vec<String>,
}

pub fn item_errors_json(errors: &[ItemError]) -> Value {
    Value::Array(
        errors
            .iter()
            .map(|e| json!({ "id": e.id, "message": e.message }))
            .collect(),
    )
}

pub fn find_section_by_name(
    store: &dyn DocumentStore,
    name: &str,
) -> anyhow::Result<Option<Document>> {
    let mut hits = store.query("classes", &[("sectionName", Value::from(name))])?;
    Ok(if hits.is_empty() {
        None
    } else {
        Some(hits.remove(0))
    })
}

fn patch(fields: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in fields {
        map.insert(k.to_string(), v.clone());
    }
    map
}

/// Source-side adjustment when persons leave a section: the denormalized
/// student count drops by the number leaving (never below zero) and a
/// departing instructor releases the section.
fn adjust_section_for_departure(
    store: &dyn DocumentStore,
    section_name: &str,
    leaving_students: usize,
    instructor_leaving: bool,
) -> anyhow::Result<()> {
    let Some(section) = find_section_by_name(store, section_name)? else {
        // Section record already gone; nothing to reconcile.
        return Ok(());
    };

    let mut fields: Vec<(&str, Value)> = Vec::new();
    if leaving_students > 0 {
        let count = section.i64_field("studentCount");
        let next = (count - leaving_students as i64).max(0);
        fields.push(("studentCount", Value::from(next)));
    }
    if instructor_leaving {
        fields.push(("instructor", Value::from("")));
    }
    if fields.is_empty() {
        return Ok(());
    }
    store.update("classes", &section.id, &patch(&fields))
}

/// Destination-side adjustment when persons arrive in a section. Instructor
/// assignment is last-write-wins; nothing checks for a concurrent claim.
fn apply_section_arrival(
    store: &dyn DocumentStore,
    section_name: &str,
    arriving_students: usize,
    instructor_name: Option<&str>,
) -> anyhow::Result<()> {
    let Some(section) = find_section_by_name(store, section_name)? else {
        anyhow::bail!("section not found: {}", section_name);
    };

    let mut fields: Vec<(&str, Value)> = Vec::new();
    if arriving_students > 0 {
        let count = section.i64_field("studentCount");
        fields.push(("studentCount", Value::from(count + arriving_students as i64)));
    }
    if let Some(name) = instructor_name {
        fields.push(("instructor", Value::from(name)));
    }
    if fields.is_empty() {
        return Ok(());
    }
    store.update("classes", &section.id, &patch(&fields))
}

/// Count/instructor update for a single newly created person, shared by the
/// admin create path and the bulk importer.
pub fn apply_destination_for_new_person(
    store: &dyn DocumentStore,
    role: &str,
    section_name: &str,
    display_name: &str,
) -> anyhow::Result<()> {
    if section_name.is_empty() {
        return Ok(());
    }
    if role == ROLE_INSTRUCTOR {
        apply_section_arrival(store, section_name, 0, Some(display_name))
    } else {
        apply_section_arrival(store, section_name, 1, None)
    }
}

pub fn normalize_target_section(raw: &str) -> String {
    let t = raw.trim();
    if t.eq_ignore_ascii_case("unassign") {
        String::new()
    } else {
        t.to_string()
    }
}

/// Moves the selected persons to `target_section` ("" = unassigned), keeping
/// the affected sections' denormalized fields in step. Steps are plain
/// sequential store calls: a failure is recorded and the batch continues, with
/// no rollback of whatever already applied.
pub fn reassign_section(
    store: &dyn DocumentStore,
    person_ids: &[String],
    target_section: &str,
) -> anyhow::Result<ReassignOutcome> {
    let target = normalize_target_section(target_section);
    let mut failed: Vec<ItemError> = Vec::new();

    let mut persons: Vec<Document> = Vec::new();
    for id in person_ids {
        match store.get("users", id)? {
            Some(doc) => persons.push(doc),
            None => failed.push(ItemError {
                id: id.clone(),
                message: "person not found".to_string(),
            }),
        }
    }

    // Fail before any mutation if the destination does not exist.
    if !target.is_empty() && find_section_by_name(store, &target)?.is_none() {
        anyhow::bail!("section not found: {}", target);
    }

    // Distinct current sections, with how many selected students each loses
    // and whether a selected instructor leaves it.
    let mut departures: BTreeMap<String, (usize, bool)> = BTreeMap::new();
    for person in &persons {
        let current = person.str_field("section").to_string();
        if current.is_empty() {
            continue;
        }
        let entry = departures.entry(current).or_insert((0, false));
        if person.str_field("role") == ROLE_INSTRUCTOR {
            entry.1 = true;
        } else {
            entry.0 += 1;
        }
    }
    for (section_name, (students, instructor)) in &departures {
        if let Err(e) = adjust_section_for_departure(store, section_name, *students, *instructor) {
            failed.push(ItemError {
                id: section_name.clone(),
                message: e.to_string(),
            });
        }
    }

    if !target.is_empty() {
        let arriving_students = persons
            .iter()
            .filter(|p| p.str_field("role") != ROLE_INSTRUCTOR)
            .count();
        // Last selected instructor wins the section, matching the write order.
        let instructor_name = persons
            .iter()
            .filter(|p| p.str_field("role") == ROLE_INSTRUCTOR)
            .last()
            .map(|p| p.str_field("name").to_string());
        if let Err(e) = apply_section_arrival(
            store,
            &target,
            arriving_students,
            instructor_name.as_deref(),
        ) {
            failed.push(ItemError {
                id: target.clone(),
                message: e.to_string(),
            });
        }
    }

    let mut updated = 0usize;
    for person in &persons {
        match store.update(
            "users",
            &person.id,
            &patch(&[("section", Value::from(target.as_str()))]),
        ) {
            Ok(()) => updated += 1,
            Err(e) => failed.push(ItemError {
                id: person.id.clone(),
                message: e.to_string(),
            }),
        }
    }

    Ok(ReassignOutcome { updated, failed })
}

/// One person's deletion, in fixed order: release the section, cascade owned
/// content, drop the person document, then the auth record. The auth step is
/// best-effort; its failure surfaces as a warning, not an error.
fn delete_one_person(
    store: &dyn DocumentStore,
    auth: &dyn AuthDirectory,
    person: &Document,
) -> anyhow::Result<Option<String>> {
    let role = person.str_field("role").to_string();
    let section = person.str_field("section").to_string();

    if !section.is_empty() {
        let (students, instructor) = if role == ROLE_INSTRUCTOR {
            (0, true)
        } else {
            (1, false)
        };
        adjust_section_for_departure(store, &section, students, instructor)?;
    }

    // Content must be located by owner id while the person still exists,
    // hence cascade before the person document goes.
    for (collection, owner_field) in OWNED_COLLECTIONS {
        let owned = store.query(collection, &[(owner_field, Value::from(person.id.as_str()))])?;
        for doc in owned {
            store.delete(collection, &doc.id)?;
        }
    }

    store.delete("users", &person.id)?;

    let warning = match auth.delete_account(&person.id) {
        Ok(true) => None,
        Ok(false) => Some(format!("auth record not found for {}", person.id)),
        Err(e) => Some(format!("auth delete failed for {}: {}", person.id, e)),
    };
    Ok(warning)
}

/// Deletes the selected persons with full cascade. Per-person failures are
/// collected and the batch continues.
pub fn delete_persons(
    store: &dyn DocumentStore,
    auth: &dyn AuthDirectory,
    person_ids: &[String],
) -> anyhow::Result<DeleteOutcome> {
    let mut deleted = 0usize;
    let mut failed: Vec<ItemError> = Vec::new();
    let mut auth_warnings: Vec<String> = Vec::new();

    for id in person_ids {
        let person = match store.get("users", id) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                failed.push(ItemError {
                    id: id.clone(),
                    message: "person not found".to_string(),
                });
                continue;
            }
            Err(e) => {
                failed.push(ItemError {
                    id: id.clone(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        match delete_one_person(store, auth, &person) {
            Ok(warning) => {
                deleted += 1;
                if let Some(w) = warning {
                    auth_warnings.push(w);
                }
            }
            Err(e) => failed.push(ItemError {
                id: id.clone(),
                message: e.to_string(),
            }),
        }
    }

    Ok(DeleteOutcome {
        deleted,
        failed,
        auth_warnings,
    })
}
