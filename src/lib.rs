//! Toolbridge: typed tool manifests turned into validated, fingerprinted,
//! recorded adapters for agent frameworks.
//!
//! A remote tool server publishes manifests; each is parsed once, fingerprinted
//! for drift detection and synthesized into a CrewAI, LangChain or AutoGen
//! shaped callable. Every call is validated before it leaves the process and
//! leaves exactly one execution record behind.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod manifest;
pub mod recorder;
pub mod registry;
pub mod source;
pub mod state;
pub mod types;
pub mod validate;

pub use adapter::{Adapter, Synthesizer, ToolAdapter};
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use manifest::{ManifestFingerprint, ToolManifest};
pub use recorder::ExecutionRecorder;
pub use registry::Registry;
pub use types::{ExecutionRecord, Framework};
