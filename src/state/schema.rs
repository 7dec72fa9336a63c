//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the registry database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Registered manifests, one row per distinct fingerprint
CREATE TABLE IF NOT EXISTS tool_registry (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint    TEXT NOT NULL UNIQUE,
    source         TEXT NOT NULL DEFAULT '',
    tool_name      TEXT NOT NULL,
    manifest_json  TEXT NOT NULL,
    registered_at  TEXT NOT NULL
);

-- One row per completed invocation attempt, in insertion order
CREATE TABLE IF NOT EXISTS execution_log (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    id               TEXT NOT NULL UNIQUE,
    fingerprint      TEXT NOT NULL,
    tool_name        TEXT NOT NULL,
    agent_framework  TEXT NOT NULL,
    input_arguments  TEXT NOT NULL DEFAULT '{}',
    status           TEXT NOT NULL,
    execution_result TEXT NOT NULL DEFAULT 'null',
    is_anomaly       INTEGER NOT NULL DEFAULT 0,
    anomaly_reason   TEXT,
    coercions        TEXT NOT NULL DEFAULT '[]',
    duration_ms      INTEGER NOT NULL DEFAULT 0,
    timestamp        TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_registry_name ON tool_registry(tool_name);
CREATE INDEX IF NOT EXISTS idx_log_tool ON execution_log(tool_name);
CREATE INDEX IF NOT EXISTS idx_log_anomaly ON execution_log(is_anomaly);
"#;
