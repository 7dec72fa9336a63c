//! SQLite registry database with WAL mode and schema versioning.
//!
//! [`Database`] wraps a single connection. [`SqliteStore`] is the storage
//! collaborator built on top of it: every operation opens its own connection
//! on a blocking thread and drops it when the statement completes, so no
//! handle outlives the operation that acquired it.

use crate::error::StorageError;
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::state::{schema, Storage, StoredManifest, StoredRecord};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-width UTC timestamps, so text order is chronological order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The registry database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent readers alongside a writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open a connection to an already-migrated database.
    fn connect(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Create the schema on first open.
    fn migrate(&mut self) -> Result<(), StorageError> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating registry schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version > schema::SCHEMA_VERSION {
            warn!(
                "Registry schema v{} is newer than supported v{}",
                version,
                schema::SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Manifests
    // -----------------------------------------------------------------------

    /// Insert a manifest unless its fingerprint is already stored.
    ///
    /// Returns `true` when a new row was written.
    pub fn upsert_manifest(
        &self,
        fingerprint: &ManifestFingerprint,
        manifest: &ToolManifest,
    ) -> Result<bool, StorageError> {
        let manifest_json = serde_json::to_string(manifest)?;
        let inserted = self.conn.execute(
            "INSERT INTO tool_registry (fingerprint, source, tool_name, manifest_json, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(fingerprint) DO NOTHING",
            params![
                fingerprint.as_str(),
                manifest.source(),
                manifest.name(),
                manifest_json,
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// All stored versions of a tool, oldest first.
    pub fn find_manifests(&self, name: &str) -> Result<Vec<StoredManifest>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT fingerprint, manifest_json, registered_at FROM tool_registry
             WHERE tool_name = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![name], stored_manifest_from_row)?;

        let mut manifests = Vec::new();
        for row in rows {
            manifests.push(row?);
        }
        Ok(manifests)
    }

    /// Every stored manifest, in registration order.
    pub fn list_manifests(&self) -> Result<Vec<StoredManifest>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT fingerprint, manifest_json, registered_at FROM tool_registry ORDER BY seq",
        )?;
        let rows = stmt.query_map([], stored_manifest_from_row)?;

        let mut manifests = Vec::new();
        for row in rows {
            manifests.push(row?);
        }
        Ok(manifests)
    }

    /// Count stored manifests.
    pub fn manifest_count(&self) -> Result<u64, StorageError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tool_registry", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Execution log
    // -----------------------------------------------------------------------

    /// Append an execution record.
    pub fn insert_record(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO execution_log (id, fingerprint, tool_name, agent_framework, input_arguments,
                status, execution_result, is_anomaly, anomaly_reason, coercions, duration_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id,
                record.fingerprint.as_str(),
                record.tool_name,
                record.framework.as_str(),
                serde_json::to_string(&record.input_arguments)?,
                record.status.to_string(),
                serde_json::to_string(&record.execution_result)?,
                record.is_anomaly as i32,
                record.anomaly_reason,
                serde_json::to_string(&record.coercions)?,
                record.duration_ms as i64,
                format_ts(&record.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Filtered records stored after `page.after`, in insertion order.
    pub fn query_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, fingerprint, tool_name, agent_framework, input_arguments, status,
                    execution_result, is_anomaly, anomaly_reason, coercions, duration_ms, timestamp,
                    seq
             FROM execution_log
             WHERE seq > ?1
               AND (?2 IS NULL OR agent_framework = ?2)
               AND (?3 IS NULL OR tool_name = ?3)
               AND (?4 = 0 OR is_anomaly = 1)
             ORDER BY seq ASC
             LIMIT ?5",
        )?;
        let rows = stmt.query_map(
            params![
                i64::try_from(page.after).unwrap_or(i64::MAX),
                filter.framework.map(|f| f.as_str()),
                filter.tool_name,
                filter.anomalies_only as i32,
                i64::try_from(page.limit).unwrap_or(i64::MAX),
            ],
            stored_record_from_row,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn stored_manifest_from_row(row: &Row<'_>) -> rusqlite::Result<StoredManifest> {
    Ok(StoredManifest {
        fingerprint: ManifestFingerprint::from_hex(row.get::<_, String>(0)?),
        manifest: json_column(row, 1)?,
        registered_at: timestamp_column(row, 2)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        fingerprint: ManifestFingerprint::from_hex(row.get::<_, String>(1)?),
        tool_name: row.get(2)?,
        framework: parse_column(row, 3)?,
        input_arguments: json_column(row, 4)?,
        status: parse_column(row, 5)?,
        execution_result: json_column(row, 6)?,
        is_anomaly: row.get::<_, i32>(7)? != 0,
        anomaly_reason: row.get(8)?,
        coercions: json_column(row, 9)?,
        duration_ms: row.get::<_, i64>(10)?.max(0) as u64,
        timestamp: timestamp_column(row, 11)?,
    })
}

fn stored_record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        seq: row.get::<_, i64>(12)?.max(0) as u64,
        record: record_from_row(row)?,
    })
}

// ---------------------------------------------------------------------------
// Storage collaborator
// ---------------------------------------------------------------------------

/// SQLite-backed [`Storage`] that acquires a connection per operation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Create or migrate the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        Database::open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against a fresh connection on a blocking thread.
    async fn with_db<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let db = Database::connect(&path)?;
            op(&db)
        })
        .await?
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn upsert_manifest(
        &self,
        fingerprint: &ManifestFingerprint,
        manifest: &ToolManifest,
    ) -> Result<(), StorageError> {
        let fingerprint = fingerprint.clone();
        let manifest = manifest.clone();
        self.with_db(move |db| db.upsert_manifest(&fingerprint, &manifest).map(|_| ()))
            .await
    }

    async fn insert_record(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.with_db(move |db| db.insert_record(&record)).await
    }

    async fn query_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let filter = filter.clone();
        self.with_db(move |db| db.query_records(&filter, page)).await
    }

    async fn find_manifests(&self, name: &str) -> Result<Vec<StoredManifest>, StorageError> {
        let name = name.to_string();
        self.with_db(move |db| db.find_manifests(&name)).await
    }

    async fn list_manifests(&self) -> Result<Vec<StoredManifest>, StorageError> {
        self.with_db(|db| db.list_manifests()).await
    }
}
