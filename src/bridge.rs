//! Discovery orchestration.
//!
//! Wires the recorder, synthesizer and registry together from a
//! [`BridgeConfig`] and translates a whole tool source at once. A manifest
//! that cannot be parsed, stored or synthesized is logged and skipped; it never
//! affects the rest of the batch.

use crate::adapter::{Adapter, Synthesizer};
use crate::config::BridgeConfig;
use crate::error::DiscoveryError;
use crate::manifest::{ManifestFingerprint, ToolManifest};
use crate::recorder::ExecutionRecorder;
use crate::registry::Registry;
use crate::source::{Invoker, ToolSource};
use crate::state::Storage;
use crate::types::Framework;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Bridge {
    config: BridgeConfig,
    recorder: Arc<ExecutionRecorder>,
    synthesizer: Synthesizer,
    registry: Registry,
}

impl Bridge {
    pub fn new(config: BridgeConfig, store: Arc<dyn Storage>) -> Self {
        let recorder = Arc::new(ExecutionRecorder::new(
            store.clone(),
            config.recorder_options(),
        ));
        let synthesizer = Synthesizer::new(recorder.clone(), config.synthesis_options());
        let registry = Registry::new(store, recorder.clone(), config.page_size);
        Self {
            config,
            recorder,
            synthesizer,
            registry,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<ExecutionRecorder> {
        &self.recorder
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse and register raw manifests, skipping the ones that fail.
    pub async fn register_raw(
        &self,
        raw: &[Value],
        source: &str,
    ) -> Vec<(ToolManifest, ManifestFingerprint)> {
        let mut registered = Vec::new();
        for payload in raw {
            let manifest = match ToolManifest::parse_with_source(payload, source) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping manifest from '{}': {}", source, e);
                    continue;
                }
            };
            match self.registry.register_manifest(&manifest).await {
                Ok(fingerprint) => registered.push((manifest, fingerprint)),
                Err(e) => warn!("Failed to register '{}': {}", manifest.name(), e),
            }
        }
        registered
    }

    /// Discover every tool of `source` and synthesize adapters for `framework`.
    pub async fn discover<S>(
        &self,
        source: Arc<S>,
        framework: &str,
    ) -> Result<Vec<Adapter>, DiscoveryError>
    where
        S: ToolSource + 'static,
    {
        let framework: Framework = framework.parse()?;
        let raw = source
            .list_tools()
            .await
            .map_err(|error| DiscoveryError::Listing {
                source_name: source.server_name().to_string(),
                error,
            })?;
        let invoker: Arc<dyn Invoker> = source.clone();

        let mut adapters = Vec::new();
        for payload in &raw {
            let manifest = match ToolManifest::parse_with_source(payload, source.server_name()) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping manifest from '{}': {}", source.server_name(), e);
                    continue;
                }
            };

            // The adapter still works when the registry is down.
            if let Err(e) = self.registry.register_manifest(&manifest).await {
                warn!("Failed to register '{}': {}", manifest.name(), e);
            }

            match self
                .synthesizer
                .synthesize_for(&manifest, framework, invoker.clone())
            {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => warn!("Cannot adapt '{}' for {}: {}", manifest.name(), framework, e),
            }
        }

        info!(
            "Discovered {}/{} tools from '{}' for {}",
            adapters.len(),
            raw.len(),
            source.server_name(),
            framework
        );
        Ok(adapters)
    }

    /// Discover `source` for every configured framework.
    pub async fn discover_configured<S>(
        &self,
        source: Arc<S>,
    ) -> Result<Vec<Adapter>, DiscoveryError>
    where
        S: ToolSource + 'static,
    {
        let mut adapters = Vec::new();
        for framework in &self.config.frameworks {
            adapters.extend(self.discover(source.clone(), framework.as_str()).await?);
        }
        Ok(adapters)
    }
}
