//! SQLite-backed secret store.
//!
//! One `secrets` table for household records and one `system_tokens` table
//! keyed by name. Ciphertext and IV are stored as lowercase hex next to the
//! cipher suite that produced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::model::{
    MetadataUpdate, NewRecord, RecordMetadata, SecretRecord, SystemTokenRecord, SystemTokenView,
    TokenName,
};
use crate::store::{SecretStore, SystemTokenStore};
use homekeep_common::{Error, RecordId, Result, SecretKind, SubjectId};
use homekeep_crypto::{CipherSuite, SealedSecret};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS secrets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    ciphertext TEXT NOT NULL,
    iv TEXT NOT NULL,
    cipher TEXT NOT NULL,
    visible_to_child INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL,
    username TEXT,
    url TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS system_tokens (
    name TEXT PRIMARY KEY,
    ciphertext TEXT NOT NULL,
    iv TEXT NOT NULL,
    cipher TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_secrets_kind ON secrets(kind);
CREATE INDEX IF NOT EXISTS idx_secrets_cipher ON secrets(cipher);
"#;

const SECRET_COLUMNS: &str = "id, owner_id, kind, title, username, url, visible_to_child, \
                              created_at, updated_at, cipher, ciphertext, iv";

/// SQLite store.
///
/// The connection is shared behind a mutex; every call runs on the
/// blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open a database file and apply the schema.
    ///
    /// # Errors
    /// - `Error::Storage` if the file cannot be opened or migrated
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(storage_error)?;
        conn.execute_batch(SCHEMA).map_err(storage_error)?;

        info!(path = %path.display(), "Secret store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("Storage task failed: {}", e)))?
    }
}

fn storage_error(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Internal(format!("Invalid stored timestamp {}", secs)))
}

/// Row as read from the `secrets` table, before decoding.
struct SecretRow {
    id: i64,
    owner_id: String,
    kind: String,
    title: String,
    username: Option<String>,
    url: Option<String>,
    visible_to_child: bool,
    created_at: i64,
    updated_at: i64,
    cipher: String,
    ciphertext: String,
    iv: String,
}

impl SecretRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            username: row.get(4)?,
            url: row.get(5)?,
            visible_to_child: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            cipher: row.get(9)?,
            ciphertext: row.get(10)?,
            iv: row.get(11)?,
        })
    }

    fn metadata(&self) -> Result<RecordMetadata> {
        let corrupt = |e: Error| Error::Internal(format!("Corrupt secret {}: {}", self.id, e));
        Ok(RecordMetadata {
            id: RecordId::new(self.id),
            owner_id: SubjectId::new(self.owner_id.clone()).map_err(corrupt)?,
            kind: SecretKind::parse(&self.kind).map_err(corrupt)?,
            title: self.title.clone(),
            username: self.username.clone(),
            url: self.url.clone(),
            visible_to_child: self.visible_to_child,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
        })
    }

    fn into_record(self) -> Result<SecretRecord> {
        let metadata = self.metadata()?;
        let id = self.id;
        let suite = CipherSuite::parse(&self.cipher)
            .map_err(|e| Error::Internal(format!("Corrupt secret {}: {}", id, e)))?;
        // An undecodable payload must not fail before the access decision;
        // it loads empty and is rejected by the cipher instead.
        let ciphertext = decode_payload(id, "ciphertext", &self.ciphertext);
        let iv = decode_payload(id, "IV", &self.iv);

        Ok(SecretRecord {
            metadata,
            suite,
            ciphertext,
            iv,
        })
    }
}

fn decode_payload(id: i64, what: &str, value: &str) -> Vec<u8> {
    hex::decode(value).unwrap_or_else(|_| {
        warn!(record_id = id, column = what, "Stored secret payload is not valid hex");
        Vec::new()
    })
}

fn load_secret(conn: &Connection, id: RecordId) -> Result<Option<SecretRecord>> {
    let sql = format!("SELECT {} FROM secrets WHERE id = ?1", SECRET_COLUMNS);
    let row = conn
        .query_row(&sql, params![id.get()], SecretRow::from_row)
        .optional()
        .map_err(storage_error)?;
    row.map(SecretRow::into_record).transpose()
}

fn token_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_token(
    (name, cipher, ciphertext, iv, updated_at): (String, String, String, String, i64),
) -> Result<SystemTokenRecord> {
    let corrupt = |what: &str| Error::Internal(format!("Corrupt {} for system token {}", what, name));
    Ok(SystemTokenRecord {
        suite: CipherSuite::parse(&cipher).map_err(|_| corrupt("cipher"))?,
        ciphertext: hex::decode(&ciphertext).map_err(|_| corrupt("ciphertext"))?,
        iv: hex::decode(&iv).map_err(|_| corrupt("IV"))?,
        updated_at: timestamp(updated_at)?,
        name: TokenName::new(name.clone()).map_err(|_| corrupt("name"))?,
    })
}

#[async_trait]
impl SecretStore for SqliteStore {
    async fn create(&self, record: NewRecord) -> Result<RecordId> {
        if !record.kind.is_owned() {
            return Err(Error::Validation(
                "System tokens are stored by name".to_string(),
            ));
        }

        self.run(move |conn| {
            let now = Utc::now().timestamp();
            conn.execute(
                r#"
                INSERT INTO secrets
                (owner_id, kind, ciphertext, iv, cipher, visible_to_child,
                 title, username, url, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                "#,
                params![
                    record.owner_id.as_str(),
                    record.kind.as_str(),
                    record.sealed.ciphertext_hex(),
                    record.sealed.iv_hex(),
                    record.sealed.suite.as_str(),
                    record.visible_to_child as i64,
                    record.title,
                    record.username,
                    record.url,
                    now,
                ],
            )
            .map_err(storage_error)?;

            let id = RecordId::new(conn.last_insert_rowid());
            debug!(id = %id, kind = %record.kind, "Secret inserted");
            Ok(id)
        })
        .await
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<SecretRecord>> {
        self.run(move |conn| load_secret(conn, id)).await
    }

    async fn list_metadata(&self, kind: Option<SecretKind>) -> Result<Vec<RecordMetadata>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM secrets WHERE (?1 IS NULL OR kind = ?1) ORDER BY id",
                SECRET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_error)?;
            let rows = stmt
                .query_map(params![kind.map(|k| k.as_str())], SecretRow::from_row)
                .map_err(storage_error)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(storage_error)?.metadata()?);
            }
            Ok(out)
        })
        .await
    }

    async fn update_secret(&self, id: RecordId, sealed: SealedSecret) -> Result<()> {
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE secrets SET ciphertext = ?1, iv = ?2, cipher = ?3, updated_at = ?4 \
                     WHERE id = ?5",
                    params![
                        sealed.ciphertext_hex(),
                        sealed.iv_hex(),
                        sealed.suite.as_str(),
                        Utc::now().timestamp(),
                        id.get(),
                    ],
                )
                .map_err(storage_error)?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Secret {} not found", id)));
            }
            Ok(())
        })
        .await
    }

    async fn swap_secret(
        &self,
        id: RecordId,
        expected_iv: &[u8],
        sealed: SealedSecret,
    ) -> Result<bool> {
        let expected = hex::encode(expected_iv);
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE secrets SET ciphertext = ?1, iv = ?2, cipher = ?3, updated_at = ?4 \
                     WHERE id = ?5 AND iv = ?6",
                    params![
                        sealed.ciphertext_hex(),
                        sealed.iv_hex(),
                        sealed.suite.as_str(),
                        Utc::now().timestamp(),
                        id.get(),
                        expected,
                    ],
                )
                .map_err(storage_error)?;
            if changed == 0 && load_secret(conn, id)?.is_none() {
                return Err(Error::NotFound(format!("Secret {} not found", id)));
            }
            Ok(changed == 1)
        })
        .await
    }

    async fn update_metadata(
        &self,
        id: RecordId,
        update: MetadataUpdate,
    ) -> Result<RecordMetadata> {
        self.run(move |conn| {
            let mut metadata = load_secret(conn, id)?
                .ok_or_else(|| Error::NotFound(format!("Secret {} not found", id)))?
                .metadata;
            update.apply(&mut metadata, Utc::now());

            conn.execute(
                "UPDATE secrets SET title = ?1, username = ?2, url = ?3, \
                 visible_to_child = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    metadata.title,
                    metadata.username,
                    metadata.url,
                    metadata.visible_to_child as i64,
                    metadata.updated_at.timestamp(),
                    id.get(),
                ],
            )
            .map_err(storage_error)?;
            Ok(metadata)
        })
        .await
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        self.run(move |conn| {
            let changed = conn
                .execute("DELETE FROM secrets WHERE id = ?1", params![id.get()])
                .map_err(storage_error)?;
            if changed == 0 {
                return Err(Error::NotFound(format!("Secret {} not found", id)));
            }
            debug!(id = %id, "Secret deleted");
            Ok(())
        })
        .await
    }

    async fn ids_with_suite(&self, suite: CipherSuite) -> Result<Vec<RecordId>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM secrets WHERE cipher = ?1 ORDER BY id")
                .map_err(storage_error)?;
            let ids = stmt
                .query_map(params![suite.as_str()], |row| row.get::<_, i64>(0))
                .map_err(storage_error)?
                .map(|id| id.map(RecordId::new).map_err(storage_error))
                .collect::<Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }
}

#[async_trait]
impl SystemTokenStore for SqliteStore {
    async fn put_token(&self, name: &TokenName, sealed: SealedSecret) -> Result<()> {
        let name = name.clone();
        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO system_tokens (name, ciphertext, iv, cipher, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(name) DO UPDATE SET
                    ciphertext = excluded.ciphertext,
                    iv = excluded.iv,
                    cipher = excluded.cipher,
                    updated_at = excluded.updated_at
                "#,
                params![
                    name.as_str(),
                    sealed.ciphertext_hex(),
                    sealed.iv_hex(),
                    sealed.suite.as_str(),
                    Utc::now().timestamp(),
                ],
            )
            .map_err(storage_error)?;
            debug!(name = %name, "System token stored");
            Ok(())
        })
        .await
    }

    async fn find_token(&self, name: &TokenName) -> Result<Option<SystemTokenRecord>> {
        let name = name.clone();
        self.run(move |conn| {
            conn.query_row(
                "SELECT name, cipher, ciphertext, iv, updated_at FROM system_tokens \
                 WHERE name = ?1",
                params![name.as_str()],
                token_from_row,
            )
            .optional()
            .map_err(storage_error)?
            .map(decode_token)
            .transpose()
        })
        .await
    }

    async fn list_tokens(&self) -> Result<Vec<SystemTokenView>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT name, updated_at FROM system_tokens ORDER BY name")
                .map_err(storage_error)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(storage_error)?;

            let mut out = Vec::new();
            for row in rows {
                let (name, updated_at) = row.map_err(storage_error)?;
                out.push(SystemTokenView {
                    name: TokenName::new(name)
                        .map_err(|e| Error::Internal(format!("Corrupt token name: {}", e)))?,
                    updated_at: timestamp(updated_at)?,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn delete_token(&self, name: &TokenName) -> Result<()> {
        let name = name.clone();
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM system_tokens WHERE name = ?1",
                    params![name.as_str()],
                )
                .map_err(storage_error)?;
            if changed == 0 {
                return Err(Error::NotFound(format!("System token {} not found", name)));
            }
            Ok(())
        })
        .await
    }

    async fn swap_token(
        &self,
        name: &TokenName,
        expected_iv: &[u8],
        sealed: SealedSecret,
    ) -> Result<bool> {
        let name = name.clone();
        let expected = hex::encode(expected_iv);
        self.run(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE system_tokens SET ciphertext = ?1, iv = ?2, cipher = ?3, \
                     updated_at = ?4 WHERE name = ?5 AND iv = ?6",
                    params![
                        sealed.ciphertext_hex(),
                        sealed.iv_hex(),
                        sealed.suite.as_str(),
                        Utc::now().timestamp(),
                        name.as_str(),
                        expected,
                    ],
                )
                .map_err(storage_error)?;
            if changed == 0 {
                let exists: Option<String> = conn
                    .query_row(
                        "SELECT name FROM system_tokens WHERE name = ?1",
                        params![name.as_str()],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(storage_error)?;
                if exists.is_none() {
                    return Err(Error::NotFound(format!("System token {} not found", name)));
                }
            }
            Ok(changed == 1)
        })
        .await
    }

    async fn tokens_with_suite(&self, suite: CipherSuite) -> Result<Vec<TokenName>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM system_tokens WHERE cipher = ?1 ORDER BY name")
                .map_err(storage_error)?;
            let rows = stmt
                .query_map(params![suite.as_str()], |row| row.get::<_, String>(0))
                .map_err(storage_error)?;

            let mut out = Vec::new();
            for row in rows {
                let name = row.map_err(storage_error)?;
                out.push(
                    TokenName::new(name)
                        .map_err(|e| Error::Internal(format!("Corrupt token name: {}", e)))?,
                );
            }
            Ok(out)
        })
        .await
    }
}
