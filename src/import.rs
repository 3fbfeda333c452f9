use crate::auth::AuthDirectory;
use crate::roster::{self, ROLE_INSTRUCTOR, ROLE_STUDENT};
use crate::store::DocumentStore;
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Students,
    Instructors,
}

impl ImportKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "students" => Some(Self::Students),
            "instructors" => Some(Self::Instructors),
            _ => None,
        }
    }

    fn role(self) -> &'static str {
        match self {
            Self::Students => ROLE_STUDENT,
            Self::Instructors => ROLE_INSTRUCTOR,
        }
    }
}

#[derive(Debug)]
pub struct RowError {
    pub row: usize,
    pub name: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub total: usize,
    pub created: usize,
    pub failed: Vec<RowError>,
}

impl ImportSummary {
    pub fn failed_json(&self) -> Value {
        Value::Array(
            self.failed
                .iter()
                .map(|e| {
                    json!({
                        "row": e.row,
                        "name": e.name,
                        "email": e.email,
                        "message": e.message
                    })
                })
                .collect(),
        )
    }
}

struct ParsedRow {
    row: usize,
    name: String,
    email: String,
    password: String,
    section: String,
}

pub fn valid_section_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
}

/// Column order is positional and kind-specific: instructor rows carry
/// `first, last, email, password, section, role`; student rows carry
/// `last, first, email, password, section`.
fn parse_row(kind: ImportKind, row: usize, line: &str, delimiter: char) -> Result<ParsedRow, RowError> {
    let fields: Vec<String> = line.split(delimiter).map(|f| f.trim().to_string()).collect();

    let (first, last, role_field) = match kind {
        ImportKind::Instructors => (
            fields.first().cloned().unwrap_or_default(),
            fields.get(1).cloned().unwrap_or_default(),
            fields.get(5).cloned().unwrap_or_default(),
        ),
        ImportKind::Students => (
            fields.get(1).cloned().unwrap_or_default(),
            fields.first().cloned().unwrap_or_default(),
            String::new(),
        ),
    };
    let email = fields.get(2).cloned().unwrap_or_default();
    let password = fields.get(3).cloned().unwrap_or_default();
    let section = fields.get(4).cloned().unwrap_or_default();

    let name = format!("{} {}", first, last).trim().to_string();

    if first.is_empty() || last.is_empty() || email.is_empty() || password.is_empty() {
        return Err(RowError {
            row,
            name,
            email,
            message: "missing required fields".to_string(),
        });
    }
    if kind == ImportKind::Instructors && !role_field.eq_ignore_ascii_case("instructor") {
        return Err(RowError {
            row,
            name,
            email,
            message: format!("role must be instructor, got: {}", role_field),
        });
    }

    Ok(ParsedRow {
        row,
        name,
        email,
        password,
        section,
    })
}

/// Ensures the named section exists, creating an empty one on demand.
/// Returns the section's current instructor for the collision check.
fn ensure_section(store: &dyn DocumentStore, name: &str) -> anyhow::Result<String> {
    if let Some(existing) = roster::find_section_by_name(store, name)? {
        return Ok(existing.str_field("instructor").to_string());
    }

    let mut fields = Map::new();
    fields.insert("sectionName".to_string(), Value::from(name));
    fields.insert("studentCount".to_string(), Value::from(0));
    fields.insert("instructor".to_string(), Value::from(""));
    fields.insert(
        "createdAt".to_string(),
        Value::from(Utc::now().to_rfc3339()),
    );
    store.create("classes", &Uuid::new_v4().to_string(), &fields)?;
    Ok(String::new())
}

pub fn new_person_fields(role: &str, name: &str, email: &str, section: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("role".to_string(), Value::from(role));
    fields.insert("name".to_string(), Value::from(name));
    fields.insert(
        "email".to_string(),
        Value::from(email.trim().to_ascii_lowercase()),
    );
    fields.insert("section".to_string(), Value::from(section));
    fields.insert(
        "createdAt".to_string(),
        Value::from(Utc::now().to_rfc3339()),
    );
    if role == ROLE_STUDENT {
        fields.insert("hearts".to_string(), Value::from(3));
        fields.insert("coins".to_string(), Value::from(0));
        fields.insert("rankPoints".to_string(), Value::from(0));
    }
    fields
}

/// Runs a tabular roster import: header row skipped, one create-and-assign
/// attempt per row, row failures collected without aborting the batch.
pub fn run_import(
    store: &dyn DocumentStore,
    auth: &dyn AuthDirectory,
    kind: ImportKind,
    text: &str,
    delimiter: char,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (line_no, raw) in text.lines().enumerate().skip(1) {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        summary.total += 1;
        let row_no = line_no + 1;

        let parsed = match parse_row(kind, row_no, line, delimiter) {
            Ok(p) => p,
            Err(e) => {
                summary.failed.push(e);
                continue;
            }
        };

        if !parsed.section.is_empty() {
            if !valid_section_name(&parsed.section) {
                summary.failed.push(RowError {
                    row: parsed.row,
                    name: parsed.name,
                    email: parsed.email,
                    message: format!("invalid section name: {}", parsed.section),
                });
                continue;
            }
            let current_instructor = match ensure_section(store, &parsed.section) {
                Ok(v) => v,
                Err(e) => {
                    summary.failed.push(RowError {
                        row: parsed.row,
                        name: parsed.name,
                        email: parsed.email,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if kind == ImportKind::Instructors
                && !current_instructor.is_empty()
                && current_instructor != parsed.name
            {
                summary.failed.push(RowError {
                    row: parsed.row,
                    name: parsed.name,
                    email: parsed.email,
                    message: format!(
                        "section {} already has instructor {}",
                        parsed.section, current_instructor
                    ),
                });
                continue;
            }
        }

        let uid = match auth.create_account(&parsed.email, &parsed.password) {
            Ok(uid) => uid,
            Err(e) => {
                summary.failed.push(RowError {
                    row: parsed.row,
                    name: parsed.name,
                    email: parsed.email,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let fields = new_person_fields(kind.role(), &parsed.name, &parsed.email, &parsed.section);
        if let Err(e) = store.create("users", &uid, &fields) {
            summary.failed.push(RowError {
                row: parsed.row,
                name: parsed.name,
                email: parsed.email,
                message: e.to_string(),
            });
            continue;
        }

        if let Err(e) =
            roster::apply_destination_for_new_person(store, kind.role(), &parsed.section, &parsed.name)
        {
            summary.failed.push(RowError {
                row: parsed.row,
                name: parsed.name,
                email: parsed.email,
                message: e.to_string(),
            });
            continue;
        }

        // Running success count; the summary is the progress report.
        summary.created += 1;
    }

    Ok(summary)
}

pub fn template(kind: ImportKind) -> &'static str {
    match kind {
        ImportKind::Instructors => {
            "First Name,Last Name,Email,Password,Section,Role\nPat,Harper,pat.harper@school.test,changeme,Section A,instructor\n"
        }
        ImportKind::Students => {
            "Last Name,First Name,Email,Password,Section\nRivera,Sam,sam.rivera@school.test,changeme,Section A\n"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::MemAuth;
    use crate::store::testing::MemStore;

    fn section_by_name(store: &MemStore, name: &str) -> Option<crate::store::Document> {
        roster::find_section_by_name(store, name).unwrap()
    }

    #[test]
    fn student_rows_create_section_once_and_count_both() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "Last Name,First Name,Email,Password,Section\n\
                    Rivera,Sam,sam@school.test,pw1,Section A\n\
                    Okafor,Lee,lee@school.test,pw2,Section A\n";

        let summary =
            run_import(&store, &auth, ImportKind::Students, text, ',').expect("import");

        assert_eq!(summary.total, 2);
        assert_eq!(summary.created, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(store.count("classes"), 1);
        let section = section_by_name(&store, "Section A").expect("section created");
        assert_eq!(section.i64_field("studentCount"), 2);
        assert_eq!(store.count("users"), 2);
    }

    #[test]
    fn rerun_rejects_every_row_and_creates_nothing() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "Last Name,First Name,Email,Password,Section\n\
                    Rivera,Sam,sam@school.test,pw1,Section A\n\
                    Okafor,Lee,lee@school.test,pw2,Section A\n";

        run_import(&store, &auth, ImportKind::Students, text, ',').expect("first import");
        let second =
            run_import(&store, &auth, ImportKind::Students, text, ',').expect("second import");

        assert_eq!(second.created, 0);
        assert_eq!(second.failed.len(), 2);
        assert!(second.failed[0].message.contains("already registered"));
        assert_eq!(store.count("users"), 2);
        let section = section_by_name(&store, "Section A").expect("section");
        assert_eq!(section.i64_field("studentCount"), 2);
    }

    #[test]
    fn instructor_row_with_wrong_role_creates_no_records() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "First Name,Last Name,Email,Password,Section,Role\n\
                    Pat,Harper,pat@school.test,pw,Section A,student\n";

        let summary =
            run_import(&store, &auth, ImportKind::Instructors, text, ',').expect("import");

        assert_eq!(summary.created, 0);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].message.contains("role must be instructor"));
        assert_eq!(store.count("users"), 0);
        assert!(auth.emails.borrow().is_empty());
    }

    #[test]
    fn instructor_collision_skips_row() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "First Name,Last Name,Email,Password,Section,Role\n\
                    Pat,Harper,pat@school.test,pw,Section A,instructor\n\
                    Lee,Moss,lee@school.test,pw,Section A,Instructor\n";

        let summary =
            run_import(&store, &auth, ImportKind::Instructors, text, ',').expect("import");

        assert_eq!(summary.created, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].message.contains("already has instructor"));
        let section = section_by_name(&store, "Section A").expect("section");
        assert_eq!(section.str_field("instructor"), "Pat Harper");
    }

    #[test]
    fn bad_section_charset_is_a_row_error() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "Last Name,First Name,Email,Password,Section\n\
                    Rivera,Sam,sam@school.test,pw,Section/A\n";

        let summary =
            run_import(&store, &auth, ImportKind::Students, text, ',').expect("import");

        assert_eq!(summary.created, 0);
        assert!(summary.failed[0].message.contains("invalid section name"));
        assert_eq!(store.count("classes"), 0);
    }

    #[test]
    fn malformed_row_reports_identity_and_batch_continues() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "Last Name,First Name,Email,Password,Section\n\
                    Rivera,Sam\n\
                    Okafor,Lee,lee@school.test,pw2,\n";

        let summary =
            run_import(&store, &auth, ImportKind::Students, text, ',').expect("import");

        assert_eq!(summary.total, 2);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].row, 2);
        assert_eq!(summary.failed[0].name, "Sam Rivera");
        // Second row has no section; nothing to create or count.
        assert_eq!(store.count("classes"), 0);
    }

    #[test]
    fn semicolon_delimiter_is_honored() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let text = "Last;First;Email;Password;Section\n\
                    Rivera;Sam;sam@school.test;pw;Section B\n";

        let summary =
            run_import(&store, &auth, ImportKind::Students, text, ';').expect("import");
        assert_eq!(summary.created, 1);
        assert!(section_by_name(&store, "Section B").is_some());
    }

    #[test]
    fn template_round_trips_through_the_importer() {
        let store = MemStore::new();
        let auth = MemAuth::new();
        let summary = run_import(
            &store,
            &auth,
            ImportKind::Instructors,
            template(ImportKind::Instructors),
            ',',
        )
        .expect("import template");
        assert_eq!(summary.created, 1);
        assert!(summary.failed.is_empty());
    }

    #[test]
    fn section_name_charset() {
        assert!(valid_section_name("Section A-1"));
        assert!(valid_section_name("8D"));
        assert!(!valid_section_name(""));
        assert!(!valid_section_name("Sec/tion"));
        assert!(!valid_section_name("Period #2"));
    }
}
