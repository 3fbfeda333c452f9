use anyhow::{anyhow, bail};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn i64_field(&self, key: &str) -> i64 {
        self.fields.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }
}

/// Contract presented by the remote document database: named collections of
/// JSON documents with id-keyed CRUD and equality-filter queries. The daemon
/// only ever talks to the store through this trait.
pub trait DocumentStore {
    fn create(&self, collection: &str, id: &str, fields: &Map<String, Value>)
        -> anyhow::Result<()>;
    fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>>;
    /// Partial update: keys in `patch` replace the stored values, other fields
    /// are untouched. Fails if the document does not exist.
    fn update(&self, collection: &str, id: &str, patch: &Map<String, Value>)
        -> anyhow::Result<()>;
    fn delete(&self, collection: &str, id: &str) -> anyhow::Result<()>;
    fn query(&self, collection: &str, filters: &[(&str, Value)]) -> anyhow::Result<Vec<Document>>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn filter_param(v: &Value) -> anyhow::Result<SqlValue> {
    match v {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                bail!("unsupported numeric filter value: {}", n)
            }
        }
        Value::Bool(b) => Ok(SqlValue::Integer(if *b { 1 } else { 0 })),
        other => bail!("unsupported filter value: {}", other),
    }
}

fn parse_fields(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => bail!("document fields must be a JSON object, got {}", other),
    }
}

impl DocumentStore for SqliteStore<'_> {
    fn create(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        let raw = serde_json::to_string(&Value::Object(fields.clone()))?;
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO documents(collection, id, fields) VALUES(?, ?, ?)",
            (collection, id, &raw),
        )?;
        if n == 0 {
            bail!("document already exists: {}/{}", collection, id);
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Document>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT fields FROM documents WHERE collection = ? AND id = ?",
                (collection, id),
                |r| r.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(Document {
                id: id.to_string(),
                fields: parse_fields(&raw)?,
            })),
            None => Ok(None),
        }
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> anyhow::Result<()> {
        // The store has no per-field write primitive; merge in code.
        let mut doc = self
            .get(collection, id)?
            .ok_or_else(|| anyhow!("document not found: {}/{}", collection, id))?;
        for (k, v) in patch {
            doc.fields.insert(k.clone(), v.clone());
        }
        let raw = serde_json::to_string(&Value::Object(doc.fields))?;
        self.conn.execute(
            "UPDATE documents SET fields = ? WHERE collection = ? AND id = ?",
            (&raw, collection, id),
        )?;
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "DELETE FROM documents WHERE collection = ? AND id = ?",
            (collection, id),
        )?;
        Ok(())
    }

    fn query(&self, collection: &str, filters: &[(&str, Value)]) -> anyhow::Result<Vec<Document>> {
        let mut sql = String::from("SELECT id, fields FROM documents WHERE collection = ?");
        let mut params: Vec<SqlValue> = vec![SqlValue::Text(collection.to_string())];
        for (field, value) in filters {
            if !field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                bail!("invalid filter field name: {}", field);
            }
            sql.push_str(&format!(" AND json_extract(fields, '$.{}') = ?", field));
            params.push(filter_param(value)?);
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let id: String = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok((id, raw))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, raw) in rows {
            out.push(Document {
                id,
                fields: parse_fields(&raw)?,
            });
        }
        Ok(out)
    }
}
