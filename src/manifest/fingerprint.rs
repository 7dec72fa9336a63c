//! Manifest fingerprinting (SHA3-256 over the canonical form).

use crate::manifest::model::{canonicalize, ToolManifest};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Deterministic digest of a manifest's semantic content.
///
/// Used by the registry as the dedup/versioning key: the same tool with a
/// changed contract gets a new fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestFingerprint(String);

impl ManifestFingerprint {
    /// Wrap an already-computed hex digest (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs and listings.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ManifestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a manifest.
pub fn fingerprint(manifest: &ToolManifest) -> ManifestFingerprint {
    let digest = Sha3_256::digest(canonicalize(manifest));
    ManifestFingerprint(hex::encode(digest))
}

impl ToolManifest {
    /// Shorthand for [`fingerprint`].
    pub fn fingerprint(&self) -> ManifestFingerprint {
        fingerprint(self)
    }
}
