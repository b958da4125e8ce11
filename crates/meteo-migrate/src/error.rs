//! Error types for the migration library.

use crate::core::model::{station_label, StationId};
use thiserror::Error;

/// Generic failure (verification mismatch, user abort, usage errors).
pub const EXIT_FAILURE: u8 = 1;
/// Source or destination could not be reached or opened.
pub const EXIT_CONNECTION_ERROR: u8 = 3;
/// Destination schema or write failure.
pub const EXIT_STORAGE_ERROR: u8 = 4;
/// Local file operation failed.
pub const EXIT_IO_ERROR: u8 = 7;
/// Interrupted by a signal.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad command-line usage.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A store could not be reached, authenticated against or opened.
    #[error("Cannot connect to {store}: {source}")]
    Connection {
        store: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Source database query error
    #[error("Source database error while {context}: {source}")]
    Source {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Target database write or query error
    #[error("Target database error while {context}: {source}")]
    Target {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Destination schema creation failed
    #[error("Schema creation failed for {object}: {source}")]
    Schema {
        object: String,
        #[source]
        source: sqlx::Error,
    },

    /// Create-only insert hit an existing primary key
    #[error("Uniqueness violation: {entity} {key} already exists in the destination")]
    UniquenessViolation { entity: &'static str, key: String },

    /// A series table outside the provisioned set was addressed
    #[error("No series table provisioned for station {0}")]
    UnknownSeries(StationId),

    /// Token references a station missing from the manifest, or none at all
    #[error("Token {token} references unknown station {}", station_label(.station))]
    DanglingToken {
        token: String,
        station: Option<StationId>,
    },

    /// Destination row count differs from the manifest
    #[error(
        "Verification failed for station {station} ({name}): imported {actual} datapoints, but source holds {expected}"
    )]
    VerificationMismatch {
        station: StationId,
        name: String,
        expected: i64,
        actual: i64,
    },

    /// Destination row values differ from the source
    #[error("Value verification failed for station {station} ({name}): {detail}")]
    ValueMismatch {
        station: StationId,
        name: String,
        detail: String,
    },

    /// One or more stations failed verification (continue policy, verify-only)
    #[error("Verification failed for {} station(s): {}", .0.len(), .0.join(", "))]
    MismatchedStations(Vec<String>),

    /// Operator declined the confirmation prompt
    #[error("Migration aborted by user")]
    Aborted,

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,

    /// Orchestrator state machine misuse
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Wrap a source query failure with context about where it occurred.
    pub fn read(source: sqlx::Error, context: impl Into<String>) -> Self {
        MigrateError::Source {
            context: context.into(),
            source,
        }
    }

    /// Wrap a target failure with context about where it occurred.
    pub fn write(source: sqlx::Error, context: impl Into<String>) -> Self {
        MigrateError::Target {
            context: context.into(),
            source,
        }
    }

    /// Wrap a schema creation failure.
    pub fn schema(source: sqlx::Error, object: impl Into<String>) -> Self {
        MigrateError::Schema {
            object: object.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Target { .. }
            | MigrateError::Schema { .. }
            | MigrateError::UniquenessViolation { .. }
            | MigrateError::UnknownSeries(_) => EXIT_STORAGE_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Config(_)
            | MigrateError::Source { .. }
            | MigrateError::MalformedInput(_)
            | MigrateError::DanglingToken { .. }
            | MigrateError::VerificationMismatch { .. }
            | MigrateError::ValueMismatch { .. }
            | MigrateError::MismatchedStations(_)
            | MigrateError::Aborted
            | MigrateError::InvalidTransition { .. }
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_FAILURE,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
