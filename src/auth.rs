use anyhow::bail;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Contract presented by the remote authentication service. Account creation
/// assigns the identifier that person documents are keyed by; deletion is
/// best-effort (`Ok(false)` when no such account exists).
pub trait AuthDirectory {
    fn create_account(&self, email: &str, password: &str) -> anyhow::Result<String>;
    fn delete_account(&self, uid: &str) -> anyhow::Result<bool>;
}

pub struct SqliteAuth<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAuth<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn password_digest(uid: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uid.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

impl AuthDirectory for SqliteAuth<'_> {
    fn create_account(&self, email: &str, password: &str) -> anyhow::Result<String> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            bail!("invalid email: {}", email);
        }
        if password.is_empty() {
            bail!("password must not be empty");
        }

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT uid FROM accounts WHERE email = ?",
                [&email],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            bail!("email already registered: {}", email);
        }

        let uid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO accounts(uid, email, password_sha256, created_at) VALUES(?, ?, ?, ?)",
            (
                &uid,
                &email,
                password_digest(&uid, password),
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(uid)
    }

    fn delete_account(&self, uid: &str) -> anyhow::Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM accounts WHERE uid = ?", [uid])?;
        Ok(n > 0)
    }
}
