use crate::ipc::error::{err, ok};
use crate::ipc::params::{opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::ROLE_STUDENT;
use crate::store::{Document, DocumentStore, SqliteStore};
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const WIN_RANK_POINTS: i64 = 25;
const WIN_COINS: i64 = 10;

fn get_person(store: &SqliteStore, id: &str) -> Result<Document, String> {
    match store.get("users", id) {
        Ok(Some(doc)) => Ok(doc),
        Ok(None) => Err(format!("person not found: {}", id)),
        Err(e) => Err(e.to_string()),
    }
}

fn handle_posts_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let user_id = match required_str(&req.params, "userId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let text = match required_str(&req.params, "text") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let author = match get_person(&store, &user_id) {
        Ok(doc) => doc,
        Err(m) => return err(&req.id, "not_found", m, None),
    };

    // Posts land in the author's section feed.
    let mut fields = Map::new();
    fields.insert("userId".to_string(), Value::from(user_id));
    fields.insert("authorName".to_string(), Value::from(author.str_field("name")));
    fields.insert("section".to_string(), Value::from(author.str_field("section")));
    fields.insert("text".to_string(), Value::from(text));
    fields.insert("createdAt".to_string(), Value::from(Utc::now().to_rfc3339()));

    let post_id = Uuid::new_v4().to_string();
    if let Err(e) = store.create("posts", &post_id, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "postId": post_id }))
}

fn handle_posts_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "posts": [] }));
    };
    let store = SqliteStore::new(conn);

    let mut filters: Vec<(&str, Value)> = Vec::new();
    let section = opt_str(&req.params, "section");
    if !section.is_empty() {
        filters.push(("section", Value::from(section.as_str())));
    }

    let mut docs = match store.query("posts", &filters) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    // Newest first.
    docs.sort_by(|a, b| b.str_field("createdAt").cmp(a.str_field("createdAt")));

    let rows: Vec<Value> = docs
        .iter()
        .map(|d| {
            let mut row = Value::Object(d.fields.clone());
            row["id"] = Value::from(d.id.as_str());
            row
        })
        .collect();
    ok(&req.id, json!({ "posts": rows }))
}

fn handle_submissions_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let activity_id = match required_str(&req.params, "activityId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(m) = get_person(&store, &student_id) {
        return err(&req.id, "not_found", m, None);
    }
    match store.get("activities", &activity_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "activity not found", None),
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    }

    let mut fields = Map::new();
    fields.insert("studentId".to_string(), Value::from(student_id));
    fields.insert("activityId".to_string(), Value::from(activity_id));
    fields.insert(
        "answers".to_string(),
        req.params.get("answers").cloned().unwrap_or(Value::Array(Vec::new())),
    );
    fields.insert(
        "score".to_string(),
        req.params.get("score").cloned().unwrap_or(Value::Null),
    );
    fields.insert("createdAt".to_string(), Value::from(Utc::now().to_rfc3339()));

    let submission_id = Uuid::new_v4().to_string();
    if let Err(e) = store.create("submissions", &submission_id, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "submissionId": submission_id }))
}

fn handle_submissions_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "submissions": [] }));
    };
    let store = SqliteStore::new(conn);

    let mut filters: Vec<(&str, Value)> = Vec::new();
    let activity_id = opt_str(&req.params, "activityId");
    if !activity_id.is_empty() {
        filters.push(("activityId", Value::from(activity_id.as_str())));
    }
    let student_id = opt_str(&req.params, "studentId");
    if !student_id.is_empty() {
        filters.push(("studentId", Value::from(student_id.as_str())));
    }

    let docs = match store.query("submissions", &filters) {
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
    ok(&req.id, json!({ "submissions": rows }))
}

fn handle_matches_record(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);

    let host_id = match required_str(&req.params, "hostId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let opponent_id = match required_str(&req.params, "opponentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let winner_id = match required_str(&req.params, "winnerId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if host_id == opponent_id {
        return err(&req.id, "bad_params", "host and opponent must differ", None);
    }
    if winner_id != host_id && winner_id != opponent_id {
        return err(&req.id, "bad_params", "winner must be a participant", None);
    }

    let host = match get_person(&store, &host_id) {
        Ok(doc) => doc,
        Err(m) => return err(&req.id, "not_found", m, None),
    };
    let opponent = match get_person(&store, &opponent_id) {
        Ok(doc) => doc,
        Err(m) => return err(&req.id, "not_found", m, None),
    };

    let game = opt_str(&req.params, "game");
    let recorded_at = Utc::now().to_rfc3339();

    let match_id = Uuid::new_v4().to_string();
    let mut fields = Map::new();
    fields.insert("hostId".to_string(), Value::from(host_id.as_str()));
    fields.insert("opponentId".to_string(), Value::from(opponent_id.as_str()));
    fields.insert("winnerId".to_string(), Value::from(winner_id.as_str()));
    fields.insert("game".to_string(), Value::from(game));
    fields.insert("createdAt".to_string(), Value::from(recorded_at.as_str()));
    if let Err(e) = store.create("matches", &match_id, &fields) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }

    // One history entry per participant, keyed by its own userId so cascade
    // deletion can find it.
    for (me, other) in [(&host, &opponent), (&opponent, &host)] {
        let mut entry = Map::new();
        entry.insert("userId".to_string(), Value::from(me.id.as_str()));
        entry.insert("matchId".to_string(), Value::from(match_id.as_str()));
        entry.insert(
            "opponentName".to_string(),
            Value::from(other.str_field("name")),
        );
        entry.insert("won".to_string(), Value::from(me.id == winner_id));
        entry.insert("createdAt".to_string(), Value::from(recorded_at.as_str()));
        if let Err(e) = store.create("matchHistory", &Uuid::new_v4().to_string(), &entry) {
            return err(&req.id, "store_write_failed", e.to_string(), None);
        }
    }

    let winner = if winner_id == host.id { &host } else { &opponent };
    let mut patch = Map::new();
    patch.insert(
        "rankPoints".to_string(),
        Value::from(winner.i64_field("rankPoints") + WIN_RANK_POINTS),
    );
    patch.insert(
        "coins".to_string(),
        Value::from(winner.i64_field("coins") + WIN_COINS),
    );
    if let Err(e) = store.update("users", &winner.id, &patch) {
        return err(&req.id, "store_write_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "matchId": match_id }))
}

fn handle_leaderboard_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "leaderboard": [] }));
    };
    let store = SqliteStore::new(conn);

    let mut filters: Vec<(&str, Value)> = vec![("role", Value::from(ROLE_STUDENT))];
    let section = opt_str(&req.params, "section");
    if !section.is_empty() {
        filters.push(("section", Value::from(section.as_str())));
    }

    let mut students = match store.query("users", &filters) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "store_query_failed", e.to_string(), None),
    };
    students.sort_by(|a, b| {
        b.i64_field("rankPoints")
            .cmp(&a.i64_field("rankPoints"))
            .then_with(|| a.str_field("name").cmp(b.str_field("name")))
    });

    let rows: Vec<Value> = students
        .iter()
        .enumerate()
        .map(|(i, s)| {
            json!({
                "rank": i + 1,
                "id": s.id,
                "name": s.str_field("name"),
                "section": s.str_field("section"),
                "rankPoints": s.i64_field("rankPoints"),
                "coins": s.i64_field("coins"),
                "hearts": s.i64_field("hearts")
            })
        })
        .collect();
    ok(&req.id, json!({ "leaderboard": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "posts.create" => Some(handle_posts_create(state, req)),
        "posts.list" => Some(handle_posts_list(state, req)),
        "submissions.create" => Some(handle_submissions_create(state, req)),
        "submissions.list" => Some(handle_submissions_list(state, req)),
        "matches.record" => Some(handle_matches_record(state, req)),
        "leaderboard.get" => Some(handle_leaderboard_get(state, req)),
        _ => None,
    }
}
