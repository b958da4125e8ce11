//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    #[serde(default)]
    pub source: SourceConfig,

    /// Target database configuration (SQLite).
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// TLS negotiation (default: preferred).
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mysql_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: SslMode::default(),
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// TLS mode for the source connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    Disabled,
    #[default]
    Preferred,
    Required,
}

/// Target database (SQLite) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Destination database file. Created if absent.
    #[serde(default)]
    pub path: PathBuf,

    /// SQLite journal mode (default: delete).
    #[serde(default)]
    pub journal_mode: JournalMode,
}

/// SQLite journal mode for the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Delete,
    Wal,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per source page (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Skip the interactive confirmation gate.
    #[serde(default)]
    pub assume_yes: bool,

    /// How station and token rows are written.
    #[serde(default)]
    pub entity_mode: EntityMode,

    /// What happens after a station fails verification.
    #[serde(default)]
    pub on_mismatch: MismatchPolicy,

    /// Depth of post-transfer verification.
    #[serde(default)]
    pub verify: VerifyMode,

    /// Handling of tokens whose station is not in the manifest.
    #[serde(default)]
    pub dangling_tokens: DanglingTokenPolicy,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            assume_yes: false,
            entity_mode: EntityMode::default(),
            on_mismatch: MismatchPolicy::default(),
            verify: VerifyMode::default(),
            dangling_tokens: DanglingTokenPolicy::default(),
        }
    }
}

/// Write mode for station and token rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityMode {
    /// Plain insert. A second run against the same destination fails.
    #[default]
    Create,

    /// Insert-or-replace keyed by primary identity. Safe to re-run.
    Merge,
}

/// Reaction to a station whose destination count differs from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Stop the run at the first mismatch.
    #[default]
    Abort,

    /// Migrate the remaining stations, fail at the end.
    Continue,
}

/// How thoroughly each station is verified after its commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Compare row counts only.
    #[default]
    Count,

    /// Compare row counts, then every row's values.
    Values,
}

/// Handling of tokens referencing a station absent from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingTokenPolicy {
    /// Import them anyway and report them.
    #[default]
    Warn,

    /// Fail before the destination is touched.
    Reject,
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_batch_size() -> usize {
    1000
}
