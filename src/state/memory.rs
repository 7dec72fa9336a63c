//! In-process storage for tests and embedders that do not need persistence.

use crate::error::StorageError;
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::state::{Storage, StoredManifest, StoredRecord};
use crate::types::{ExecutionRecord, Page, RecordFilter};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    manifests: Mutex<Vec<StoredManifest>>,
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn upsert_manifest(
        &self,
        fingerprint: &ManifestFingerprint,
        manifest: &ToolManifest,
    ) -> Result<(), StorageError> {
        let mut manifests = self.manifests.lock().await;
        if !manifests.iter().any(|m| &m.fingerprint == fingerprint) {
            manifests.push(StoredManifest {
                fingerprint: fingerprint.clone(),
                manifest: manifest.clone(),
                registered_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn insert_record(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn query_records(
        &self,
        filter: &RecordFilter,
        page: Page,
    ) -> Result<Vec<StoredRecord>, StorageError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .zip(1u64..)
            .skip_while(|(_, seq)| *seq <= page.after)
            .filter(|(record, _)| filter.accepts(record))
            .take(page.limit)
            .map(|(record, seq)| StoredRecord {
                seq,
                record: record.clone(),
            })
            .collect())
    }

    async fn find_manifests(&self, name: &str) -> Result<Vec<StoredManifest>, StorageError> {
        Ok(self
            .manifests
            .lock()
            .await
            .iter()
            .filter(|m| m.manifest.name() == name)
            .cloned()
            .collect())
    }

    async fn list_manifests(&self) -> Result<Vec<StoredManifest>, StorageError> {
        Ok(self.manifests.lock().await.clone())
    }
}
