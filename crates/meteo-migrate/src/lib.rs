//! # meteo-migrate
//!
//! Moves a meteo station database from MySQL into a single SQLite file.
//!
//! The legacy store keeps stations, their access tokens and one time-series
//! table per station. This library copies all three and verifies every
//! station's series before moving on:
//!
//! - **Manifest first**: station list, tokens and per-station row counts are
//!   read once and used as the verification baseline
//! - **Paged transfer** with one commit per station
//! - **Idempotent re-runs**: datapoints are upserted by timestamp; stations
//!   and tokens are merged by key unless create-only mode is requested
//! - **Count or value verification** after each station
//!
//! ## Example
//!
//! ```rust,no_run
//! use meteo_migrate::{Config, Manifest, Orchestrator, SqliteTarget};
//!
//! #[tokio::main]
//! async fn main() -> meteo_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     config.validate()?;
//!     let orchestrator = Orchestrator::connect(&config).await?;
//!     let mut confirm = |_: &Manifest| -> meteo_migrate::Result<bool> { Ok(true) };
//!     let result = orchestrator
//!         .run(&mut confirm, || {
//!             SqliteTarget::open(&config.target, config.migration.entity_mode)
//!         })
//!         .await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod verify;

// Re-exports for convenient access
pub use crate::config::{
    Config, DanglingTokenPolicy, EntityMode, MigrationConfig, MismatchPolicy, SourceConfig,
    TargetConfig, VerifyMode,
};
pub use crate::core::{DataPoint, SeriesTable, SourceStore, Station, StationId, TargetStore, Token};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    Confirm, Manifest, MigrationEvent, MigrationResult, Orchestrator, Phase, StationReport,
};
pub use source::MysqlSource;
pub use target::SqliteTarget;
pub use verify::CountCheck;
