//! SQLite store of `cardano-cli` query responses, keyed by the SHA-256 of the
//! rendered command. Lets an offline (air-gapped) host answer queries recorded
//! on an online one.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A recorded response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub command: String,
    pub stdout: String,
    pub recorded_at: OffsetDateTime,
}

pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open or create the cache at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                stdout TEXT NOT NULL,
                recorded_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_recorded ON responses(recorded_utc);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Content-hash key for a rendered command line.
    pub fn key_for(command: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(command.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))
    }

    pub fn get(&self, command: &str) -> Result<Option<CachedResponse>, CacheError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT command, stdout, recorded_utc FROM responses WHERE key = ?1")?;
        let row = stmt
            .query_row([Self::key_for(command)], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                ))
            })
            .optional()?;
        Ok(row.map(|(command, stdout, ts)| CachedResponse {
            command,
            stdout,
            recorded_at: OffsetDateTime::from_unix_timestamp(ts)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }))
    }

    /// Insert or replace the response recorded for `command`.
    pub fn put(&self, command: &str, stdout: &str) -> Result<(), CacheError> {
        let recorded = OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (key, command, stdout, recorded_utc) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![Self::key_for(command), command, stdout, recorded],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM responses", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn key_is_deterministic_sha256() {
        let k1 = Cache::key_for("cardano-cli conway query tip --mainnet");
        let k2 = Cache::key_for("cardano-cli conway query tip --mainnet");
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
        assert_ne!(k1, Cache::key_for("cardano-cli conway query tip --testnet-magic 1"));
    }

    #[test]
    fn put_get_roundtrip_on_disk() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        assert!(cache.is_empty().unwrap());
        cache.put("cmd a", r#"{"slot":1}"#).unwrap();
        let hit = cache.get("cmd a").unwrap().unwrap();
        assert_eq!(hit.command, "cmd a");
        assert_eq!(hit.stdout, r#"{"slot":1}"#);
        assert!(cache.get("cmd b").unwrap().is_none());
    }

    #[test]
    fn put_replaces_previous_response() {
        let cache = Cache::in_memory().unwrap();
        cache.put("cmd", "old").unwrap();
        cache.put("cmd", "new").unwrap();
        assert_eq!(cache.get("cmd").unwrap().unwrap().stdout, "new");
        assert_eq!(cache.len().unwrap(), 1);
    }
}
