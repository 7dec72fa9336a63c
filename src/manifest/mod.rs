pub mod fingerprint;
pub mod model;

pub use fingerprint::{fingerprint, ManifestFingerprint};
pub use model::{canonicalize, parse, ManifestBuilder, Parameter, ToolManifest};
