//! Registry storage: manifests and execution records.

pub mod database;
pub mod memory;
pub mod schema;

pub use database::{Database, SqliteStore};
pub use memory::MemoryStore;

use crate::error::StorageError;
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::types::{ExecutionRecord, Page, RecordFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A manifest as persisted by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredManifest {
    pub fingerprint: ManifestFingerprint,
    pub manifest: ToolManifest,
    pub registered_at: DateTime<Utc>,
}

/// An execution record with its position in the store's insertion sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub seq: u64,
    pub record: ExecutionRecord,
}

/// Storage collaborator behind the recorder and the registry facade.
///
/// Each write is a single upsert or insert. Implementations must be safe to
/// call from many concurrent invocations.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `manifest` unless `fingerprint` is already present.
    async fn upsert_manifest(
        &self,
        fingerprint: &ManifestFingerprint,
        manifest: &ToolManifest,
    ) -> Result<(), StorageError>;

    async fn insert_record(&self, record: &ExecutionRecord) -> Result<(), StorageError>;

    /// Records passing `filter` in insertion order, windowed by `page`.
    ///
    /// Sequence numbers are assigned on insert, start at 1 and only grow.
    async fn query_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<StoredRecord>, StorageError>;

    /// Every stored version of tool `name`, oldest first.
    async fn find_manifests(&self, name: &str) -> Result<Vec<StoredManifest>, StorageError>;

    async fn list_manifests(&self) -> Result<Vec<StoredManifest>, StorageError>;
}
