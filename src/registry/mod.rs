//! Registry facade.
//!
//! Read/write surface over registered manifests and execution records for
//! telemetry consumers. Storage handles never leave this module.

use crate::error::{RegistryError, StorageError};
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::recorder::ExecutionRecorder;
use crate::state::{Storage, StoredManifest};
use crate::types::{ExecutionRecord, Page, RecordFilter, ToolStats};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct Registry {
    store: Arc<dyn Storage>,
    recorder: Arc<ExecutionRecorder>,
    page_size: usize,
}

impl Registry {
    pub fn new(store: Arc<dyn Storage>, recorder: Arc<ExecutionRecorder>, page_size: usize) -> Self {
        Self {
            store,
            recorder,
            page_size: page_size.max(1),
        }
    }

    /// Store a manifest under its fingerprint. Registering the same contract
    /// again is a no-op; a new contract for a known tool is logged as drift.
    pub async fn register_manifest(
        &self,
        manifest: &ToolManifest,
    ) -> Result<ManifestFingerprint, StorageError> {
        let fingerprint = manifest.fingerprint();
        let versions = self.store.find_manifests(manifest.name()).await?;

        if versions.iter().any(|v| v.fingerprint == fingerprint) {
            return Ok(fingerprint);
        }

        if let Some(previous) = versions
            .iter()
            .rev()
            .find(|v| v.manifest.source() == manifest.source())
        {
            warn!(
                "Contract drift for '{}' from '{}': {} -> {}",
                manifest.name(),
                manifest.source(),
                previous.fingerprint.short(),
                fingerprint.short()
            );
        }

        self.store.upsert_manifest(&fingerprint, manifest).await?;
        info!("Registered {} [{}]", manifest.name(), fingerprint.short());
        Ok(fingerprint)
    }

    /// Latest registered version of tool `name`.
    pub async fn get_manifest(&self, name: &str) -> Result<ToolManifest, RegistryError> {
        self.store
            .find_manifests(name)
            .await?
            .pop()
            .map(|stored| stored.manifest)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Every registered version of tool `name`, oldest first.
    pub async fn manifest_history(&self, name: &str) -> Result<Vec<StoredManifest>, StorageError> {
        self.store.find_manifests(name).await
    }

    pub async fn list_manifests(&self) -> Result<Vec<StoredManifest>, StorageError> {
        self.store.list_manifests().await
    }

    /// Records matching `filter`, oldest first, fetched page by page.
    pub fn list_records(&self, filter: RecordFilter) -> RecordCursor {
        RecordCursor {
            store: self.store.clone(),
            filter,
            after: 0,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Aggregate success and anomaly counts for tool `name`.
    pub async fn tool_stats(&self, name: &str) -> Result<ToolStats, StorageError> {
        let mut cursor = self.list_records(RecordFilter::new().tool(name));
        let mut total = 0u64;
        let mut anomalies = 0u64;
        let mut last_anomaly = None;

        while let Some(record) = cursor.next().await? {
            total += 1;
            if record.is_anomaly {
                anomalies += 1;
                last_anomaly = record.anomaly_reason;
            }
        }

        let success_rate = if total == 0 {
            1.0
        } else {
            (total - anomalies) as f64 / total as f64
        };

        Ok(ToolStats {
            tool_name: name.to_string(),
            total,
            anomalies,
            success_rate,
            last_anomaly,
        })
    }

    /// Push feed of records as they are produced.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionRecord> {
        self.recorder.subscribe()
    }
}

/// Lazy, paged iteration over execution records.
///
/// Pages are keyed on the storage insertion sequence, so a record is yielded
/// at most once and records stored after a page was read are never skipped.
pub struct RecordCursor {
    store: Arc<dyn Storage>,
    filter: RecordFilter,
    /// Sequence number of the last record fetched.
    after: u64,
    page_size: usize,
    buffer: VecDeque<ExecutionRecord>,
    exhausted: bool,
}

impl RecordCursor {
    /// Next record, fetching another page from storage when needed.
    pub async fn next(&mut self) -> Result<Option<ExecutionRecord>, StorageError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Drain up to `limit` records.
    pub async fn take(&mut self, limit: usize) -> Result<Vec<ExecutionRecord>, StorageError> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.next().await? {
                Some(record) => out.push(record),
                None => break,
            }
        }
        Ok(out)
    }

    /// Drain every remaining record.
    pub async fn collect(mut self) -> Result<Vec<ExecutionRecord>, StorageError> {
        self.take(usize::MAX).await
    }

    /// Records stored since the cursor was last exhausted.
    pub async fn poll(&mut self) -> Result<Vec<ExecutionRecord>, StorageError> {
        self.exhausted = false;
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }

    async fn fetch_page(&mut self) -> Result<(), StorageError> {
        let page = Page {
            after: self.after,
            limit: self.page_size,
        };
        let records = self.store.query_records(&self.filter, page).await?;
        if records.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = records.last() {
            self.after = last.seq;
        }
        self.buffer.extend(records.into_iter().map(|stored| stored.record));
        Ok(())
    }
}
