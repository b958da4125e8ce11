//! Core abstractions shared by the adapters and the orchestrator.
//!
//! - [`model`]: stations, tokens and datapoints
//! - [`identifier`]: identifier quoting and per-station series table names
//! - [`traits`]: the [`SourceStore`] and [`TargetStore`] adapter seams

pub mod identifier;
pub mod model;
pub mod traits;

pub use identifier::SeriesTable;
pub use model::{DataPoint, Station, StationId, Token};
pub use traits::{SourceStore, TargetStore};
