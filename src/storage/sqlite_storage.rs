// SQLite key-value backend: one row per key, whole-document writes
use super::KvStore;
use crate::types::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;

pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    /// Opens (creating parent directories and schema as needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened bank store");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(Self { conn })
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO kv (key, value) VALUES (?1, ?2)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = CURRENT_TIMESTAMP"#,
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_remove() {
        let mut kv = SqliteKv::in_memory().unwrap();
        assert_eq!(kv.get("custom_bank_v1").unwrap(), None);
        kv.set("custom_bank_v1", "{}").unwrap();
        kv.set("custom_bank_v1", r#"{"s1":{}}"#).unwrap();
        assert_eq!(kv.get("custom_bank_v1").unwrap().as_deref(), Some(r#"{"s1":{}}"#));
        kv.remove("custom_bank_v1").unwrap();
        assert_eq!(kv.get("custom_bank_v1").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bank.sqlite3");
        {
            let mut kv = SqliteKv::open(&path).unwrap();
            kv.set("github_cfg_v1", r#"{"owner":"o"}"#).unwrap();
        }
        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.get("github_cfg_v1").unwrap().as_deref(), Some(r#"{"owner":"o"}"#));
    }
}
