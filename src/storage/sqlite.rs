//! SQLite-backed repository.
//!
//! # Responsibilities
//! - Create the schema on open
//! - Persist endpoints, fingerprints and samples durably
//! - Fold each check-then-act sequence into one statement or transaction
//!
//! # Design Decisions
//! - One connection behind a mutex; calls run on the blocking pool
//! - Endpoint upsert and fingerprint creation use `ON CONFLICT` on the
//!   unique identity columns, so concurrent writers cannot duplicate rows
//! - The bounded sample insert is a conditional counter update followed by
//!   the insert, inside one IMMEDIATE transaction
//! - "Oldest" sample means lowest id (first retained)
//! - Headers, bodies and queries are stored as JSON text

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::storage::types::*;
use crate::storage::Repository;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS endpoints (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    method          TEXT    NOT NULL,
    path            TEXT    NOT NULL,
    normalized_path TEXT    NOT NULL,
    first_seen      TEXT    NOT NULL,
    last_seen       TEXT    NOT NULL,
    request_count   INTEGER NOT NULL DEFAULT 1,
    metadata        TEXT,
    UNIQUE (method, normalized_path)
);

CREATE TABLE IF NOT EXISTS fingerprints (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint_id         INTEGER NOT NULL REFERENCES endpoints (id),
    fingerprint_hash    TEXT    NOT NULL,
    status_code         INTEGER NOT NULL,
    structure_signature TEXT    NOT NULL,
    first_seen          TEXT    NOT NULL,
    last_seen           TEXT    NOT NULL,
    occurrence_count    INTEGER NOT NULL DEFAULT 1,
    sample_count        INTEGER NOT NULL DEFAULT 0,
    UNIQUE (endpoint_id, fingerprint_hash, status_code)
);

CREATE TABLE IF NOT EXISTS samples (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint_id   INTEGER NOT NULL REFERENCES fingerprints (id),
    captured_at      TEXT    NOT NULL,
    request_headers  TEXT    NOT NULL,
    request_body     TEXT,
    request_query    TEXT,
    response_headers TEXT    NOT NULL,
    response_body    TEXT    NOT NULL,
    response_time_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_samples_fingerprint ON samples (fingerprint_id, id);
"#;

const FINGERPRINT_COLUMNS: &str = "id, endpoint_id, fingerprint_hash, status_code, structure_signature, \
     first_seen, last_seen, occurrence_count, sample_count";

/// Durable repository on a single SQLite database.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn fingerprint_exists(conn: &Connection, id: FingerprintId) -> StorageResult<bool> {
    let found = conn
        .query_row("SELECT 1 FROM fingerprints WHERE id = ?1", params![id.0], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn require_fingerprint(conn: &Connection, id: FingerprintId) -> StorageResult<()> {
    if fingerprint_exists(conn, id)? {
        Ok(())
    } else {
        Err(StorageError::NotFound {
            entity: "fingerprint",
            id: id.0,
        })
    }
}

fn insert_sample(tx: &Transaction<'_>, fingerprint_id: FingerprintId, payload: &SamplePayload) -> StorageResult<SampleId> {
    let request_body = payload.request_body.as_ref().map(serde_json::to_string).transpose()?;
    let request_query = payload.request_query.as_ref().map(serde_json::to_string).transpose()?;

    tx.execute(
        "INSERT INTO samples (fingerprint_id, captured_at, request_headers, request_body, request_query,
                              response_headers, response_body, response_time_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            fingerprint_id.0,
            payload.captured_at.to_rfc3339(),
            serde_json::to_string(&payload.request_headers)?,
            request_body,
            request_query,
            serde_json::to_string(&payload.response_headers)?,
            serde_json::to_string(&payload.response_body)?,
            payload.response_time_ms as i64,
        ],
    )?;
    Ok(SampleId(tx.last_insert_rowid()))
}

fn parse_time(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn endpoint_from_row(row: &Row<'_>) -> rusqlite::Result<Endpoint> {
    Ok(Endpoint {
        id: EndpointId(row.get(0)?),
        method: row.get(1)?,
        path: row.get(2)?,
        normalized_path: row.get(3)?,
        first_seen: parse_time(4, row.get(4)?)?,
        last_seen: parse_time(5, row.get(5)?)?,
        request_count: row.get::<_, i64>(6)? as u64,
        metadata: row.get(7)?,
    })
}

fn fingerprint_from_row(row: &Row<'_>) -> rusqlite::Result<FingerprintRecord> {
    Ok(FingerprintRecord {
        id: FingerprintId(row.get(0)?),
        endpoint_id: EndpointId(row.get(1)?),
        hash: row.get(2)?,
        status_code: row.get(3)?,
        signature: row.get(4)?,
        first_seen: parse_time(5, row.get(5)?)?,
        last_seen: parse_time(6, row.get(6)?)?,
        occurrence_count: row.get::<_, i64>(7)? as u64,
        sample_count: row.get(8)?,
    })
}

/// Raw sample columns; JSON is decoded outside the row callback.
struct SampleRow {
    id: i64,
    fingerprint_id: i64,
    captured_at: DateTime<Utc>,
    request_headers: String,
    request_body: Option<String>,
    request_query: Option<String>,
    response_headers: String,
    response_body: String,
    response_time_ms: i64,
}

impl SampleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fingerprint_id: row.get(1)?,
            captured_at: parse_time(2, row.get(2)?)?,
            request_headers: row.get(3)?,
            request_body: row.get(4)?,
            request_query: row.get(5)?,
            response_headers: row.get(6)?,
            response_body: row.get(7)?,
            response_time_ms: row.get(8)?,
        })
    }

    fn into_sample(self) -> StorageResult<Sample> {
        Ok(Sample {
            id: SampleId(self.id),
            fingerprint_id: FingerprintId(self.fingerprint_id),
            payload: SamplePayload {
                captured_at: self.captured_at,
                request_headers: serde_json::from_str(&self.request_headers)?,
                request_body: self.request_body.as_deref().map(serde_json::from_str).transpose()?,
                request_query: self.request_query.as_deref().map(serde_json::from_str).transpose()?,
                response_headers: serde_json::from_str(&self.response_headers)?,
                response_body: serde_json::from_str(&self.response_body)?,
                response_time_ms: self.response_time_ms as u64,
            },
        })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_endpoint(&self, input: &EndpointInput) -> StorageResult<EndpointId> {
        let input = input.clone();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let id = conn.query_row(
                "INSERT INTO endpoints (method, path, normalized_path, first_seen, last_seen, request_count, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?4, 1, ?5)
                 ON CONFLICT (method, normalized_path) DO UPDATE SET
                     last_seen = excluded.last_seen,
                     request_count = endpoints.request_count + 1,
                     path = excluded.path,
                     metadata = COALESCE(excluded.metadata, endpoints.metadata)
                 RETURNING id",
                params![input.method, input.path, input.normalized_path, now, input.metadata],
                |row| row.get(0),
            )?;
            Ok(EndpointId(id))
        })
        .await
    }

    async fn find_fingerprint(
        &self,
        endpoint_id: EndpointId,
        hash: &str,
        status_code: u16,
    ) -> StorageResult<Option<FingerprintRecord>> {
        let hash = hash.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {FINGERPRINT_COLUMNS} FROM fingerprints
                 WHERE endpoint_id = ?1 AND fingerprint_hash = ?2 AND status_code = ?3"
            );
            Ok(conn
                .query_row(&sql, params![endpoint_id.0, hash, status_code], fingerprint_from_row)
                .optional()?)
        })
        .await
    }

    async fn create_fingerprint(&self, input: &NewFingerprint) -> StorageResult<FingerprintCreation> {
        let input = input.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = Utc::now().to_rfc3339();
            let inserted = tx.execute(
                "INSERT INTO fingerprints (endpoint_id, fingerprint_hash, status_code, structure_signature,
                                           first_seen, last_seen, occurrence_count, sample_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1, 0)
                 ON CONFLICT (endpoint_id, fingerprint_hash, status_code) DO NOTHING",
                params![input.endpoint_id.0, input.hash, input.status_code, input.signature, now],
            )?;

            let creation = if inserted == 1 {
                FingerprintCreation {
                    id: FingerprintId(tx.last_insert_rowid()),
                    created: true,
                }
            } else {
                let id = tx.query_row(
                    "SELECT id FROM fingerprints
                     WHERE endpoint_id = ?1 AND fingerprint_hash = ?2 AND status_code = ?3",
                    params![input.endpoint_id.0, input.hash, input.status_code],
                    |row| row.get(0),
                )?;
                FingerprintCreation {
                    id: FingerprintId(id),
                    created: false,
                }
            };
            tx.commit()?;
            Ok(creation)
        })
        .await
    }

    async fn increment_fingerprint_occurrence(&self, id: FingerprintId) -> StorageResult<()> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE fingerprints SET occurrence_count = occurrence_count + 1, last_seen = ?2 WHERE id = ?1",
                params![id.0, Utc::now().to_rfc3339()],
            )?;
            if updated == 0 {
                return Err(StorageError::NotFound {
                    entity: "fingerprint",
                    id: id.0,
                });
            }
            Ok(())
        })
        .await
    }

    async fn get_sample_count(&self, id: FingerprintId) -> StorageResult<u32> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT sample_count FROM fingerprints WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::NotFound {
                entity: "fingerprint",
                id: id.0,
            })
        })
        .await
    }

    async fn create_sample(
        &self,
        fingerprint_id: FingerprintId,
        payload: &SamplePayload,
    ) -> StorageResult<SampleId> {
        let payload = payload.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_fingerprint(&tx, fingerprint_id)?;
            let id = insert_sample(&tx, fingerprint_id, &payload)?;
            tx.execute(
                "UPDATE fingerprints SET sample_count = sample_count + 1 WHERE id = ?1",
                params![fingerprint_id.0],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn try_create_sample(
        &self,
        fingerprint_id: FingerprintId,
        payload: &SamplePayload,
        cap: u32,
    ) -> StorageResult<Option<SampleId>> {
        let payload = payload.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let reserved = tx.execute(
                "UPDATE fingerprints SET sample_count = sample_count + 1
                 WHERE id = ?1 AND sample_count < ?2",
                params![fingerprint_id.0, cap],
            )?;
            if reserved == 0 {
                require_fingerprint(&tx, fingerprint_id)?;
                return Ok(None);
            }
            let id = insert_sample(&tx, fingerprint_id, &payload)?;
            tx.commit()?;
            Ok(Some(id))
        })
        .await
    }

    async fn delete_oldest_sample(&self, fingerprint_id: FingerprintId) -> StorageResult<bool> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_fingerprint(&tx, fingerprint_id)?;
            let deleted = tx.execute(
                "DELETE FROM samples WHERE id = (
                     SELECT id FROM samples WHERE fingerprint_id = ?1 ORDER BY id ASC LIMIT 1
                 )",
                params![fingerprint_id.0],
            )?;
            if deleted == 1 {
                tx.execute(
                    "UPDATE fingerprints SET sample_count = sample_count - 1 WHERE id = ?1",
                    params![fingerprint_id.0],
                )?;
            }
            tx.commit()?;
            Ok(deleted == 1)
        })
        .await
    }

    async fn get_fingerprint(&self, id: FingerprintId) -> StorageResult<Option<FingerprintRecord>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {FINGERPRINT_COLUMNS} FROM fingerprints WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id.0], fingerprint_from_row).optional()?)
        })
        .await
    }

    async fn list_endpoints(&self) -> StorageResult<Vec<Endpoint>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, method, path, normalized_path, first_seen, last_seen, request_count, metadata
                 FROM endpoints ORDER BY id",
            )?;
            let endpoints = stmt
                .query_map([], endpoint_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(endpoints)
        })
        .await
    }

    async fn list_fingerprints(&self, endpoint_id: EndpointId) -> StorageResult<Vec<FingerprintRecord>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {FINGERPRINT_COLUMNS} FROM fingerprints WHERE endpoint_id = ?1 ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![endpoint_id.0], fingerprint_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn list_samples(&self, fingerprint_id: FingerprintId) -> StorageResult<Vec<Sample>> {
        self.with_conn(move |conn| {
            require_fingerprint(conn, fingerprint_id)?;
            let mut stmt = conn.prepare(
                "SELECT id, fingerprint_id, captured_at, request_headers, request_body, request_query,
                        response_headers, response_body, response_time_ms
                 FROM samples WHERE fingerprint_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![fingerprint_id.0], SampleRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(SampleRow::into_sample).collect()
        })
        .await
    }

    async fn stats(&self) -> StorageResult<RepositoryStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                     (SELECT COUNT(*) FROM endpoints),
                     (SELECT COUNT(*) FROM fingerprints),
                     (SELECT COUNT(*) FROM samples),
                     (SELECT COALESCE(SUM(occurrence_count), 0) FROM fingerprints)",
                [],
                |row| {
                    Ok(RepositoryStats {
                        total_endpoints: row.get::<_, i64>(0)? as u64,
                        total_fingerprints: row.get::<_, i64>(1)? as u64,
                        total_samples: row.get::<_, i64>(2)? as u64,
                        total_requests: row.get::<_, i64>(3)? as u64,
                    })
                },
            )?;
            Ok(stats)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint_input(path: &str) -> EndpointInput {
        EndpointInput {
            method: "GET".to_string(),
            path: path.to_string(),
            normalized_path: crate::routing::normalize_path(path),
            metadata: None,
        }
    }

    fn payload(body: serde_json::Value) -> SamplePayload {
        let mut headers = Headers::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let mut query = QueryParams::new();
        query.insert("page".to_string(), "2".to_string());
        SamplePayload {
            captured_at: Utc::now(),
            request_headers: headers.clone(),
            request_body: Some(serde_json::json!({"q": "x"})),
            request_query: Some(query),
            response_headers: headers,
            response_body: body,
            response_time_ms: 17,
        }
    }

    async fn seeded() -> (SqliteRepository, FingerprintId) {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let endpoint = repo.upsert_endpoint(&endpoint_input("/users/1")).await.unwrap();
        let fp = repo
            .create_fingerprint(&NewFingerprint {
                endpoint_id: endpoint,
                hash: "h".to_string(),
                status_code: 200,
                signature: "{id:number}".to_string(),
            })
            .await
            .unwrap();
        assert!(fp.created);
        (repo, fp.id)
    }

    #[tokio::test]
    async fn test_endpoint_upsert() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let a = repo.upsert_endpoint(&endpoint_input("/users/1")).await.unwrap();
        let b = repo.upsert_endpoint(&endpoint_input("/users/7")).await.unwrap();
        let c = repo.upsert_endpoint(&endpoint_input("/orders")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let endpoints = repo.list_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].request_count, 2);
        assert_eq!(endpoints[0].path, "/users/7");
        assert!(endpoints[0].last_seen >= endpoints[0].first_seen);
    }

    #[tokio::test]
    async fn test_create_fingerprint_is_idempotent() {
        let (repo, id) = seeded().await;
        let again = repo
            .create_fingerprint(&NewFingerprint {
                endpoint_id: EndpointId(1),
                hash: "h".to_string(),
                status_code: 200,
                signature: "{id:number}".to_string(),
            })
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.id, id);

        let record = repo.find_fingerprint(EndpointId(1), "h", 200).await.unwrap().unwrap();
        assert_eq!(record.occurrence_count, 1);
        assert_eq!(record.sample_count, 0);
        assert_eq!(record.signature, "{id:number}");
    }

    #[tokio::test]
    async fn test_bounded_insert_respects_cap() {
        let (repo, id) = seeded().await;
        for _ in 0..3 {
            assert!(repo.try_create_sample(id, &payload(serde_json::json!({"id": 1})), 3).await.unwrap().is_some());
        }
        assert!(repo.try_create_sample(id, &payload(serde_json::json!({"id": 1})), 3).await.unwrap().is_none());
        assert_eq!(repo.get_sample_count(id).await.unwrap(), 3);
        assert_eq!(repo.list_samples(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sample_round_trip_and_eviction_order() {
        let (repo, id) = seeded().await;
        repo.create_sample(id, &payload(serde_json::json!({"id": 1}))).await.unwrap();
        repo.create_sample(id, &payload(serde_json::json!({"id": 2}))).await.unwrap();

        let samples = repo.list_samples(id).await.unwrap();
        assert_eq!(samples[0].payload.response_body, serde_json::json!({"id": 1}));
        assert_eq!(samples[0].payload.request_query.as_ref().unwrap()["page"], "2");
        assert_eq!(samples[0].payload.response_time_ms, 17);

        assert!(repo.delete_oldest_sample(id).await.unwrap());
        let remaining = repo.list_samples(id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].payload.response_body, serde_json::json!({"id": 2}));
        assert_eq!(repo.get_sample_count(id).await.unwrap(), 1);

        assert!(repo.delete_oldest_sample(id).await.unwrap());
        assert!(!repo.delete_oldest_sample(id).await.unwrap());
        assert_eq!(repo.get_sample_count(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_fingerprint() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        assert!(matches!(
            repo.increment_fingerprint_occurrence(FingerprintId(5)).await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            repo.try_create_sample(FingerprintId(5), &payload(serde_json::json!({})), 3).await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(repo.get_fingerprint(FingerprintId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.db");
        {
            let repo = SqliteRepository::open(&path).unwrap();
            let endpoint = repo.upsert_endpoint(&endpoint_input("/users/1")).await.unwrap();
            let fp = repo
                .create_fingerprint(&NewFingerprint {
                    endpoint_id: endpoint,
                    hash: "h".to_string(),
                    status_code: 200,
                    signature: "{}".to_string(),
                })
                .await
                .unwrap()
                .id;
            repo.increment_fingerprint_occurrence(fp).await.unwrap();
            repo.create_sample(fp, &payload(serde_json::json!({}))).await.unwrap();
        }

        let reopened = SqliteRepository::open(&path).unwrap();
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.total_endpoints, 1);
        assert_eq!(stats.total_fingerprints, 1);
        assert_eq!(stats.total_samples, 1);
        assert_eq!(stats.total_requests, 2);
    }
}
