//! Progress events and the confirmation gate.

use serde::Serialize;
use tokio::sync::mpsc;

use super::manifest::Manifest;
use super::phase::Phase;
use crate::core::model::{Station, StationId};
use crate::error::Result;
use crate::verify::CountCheck;

/// Progress notifications emitted while a run advances.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    ManifestFetched(Manifest),
    PhaseEntered { phase: Phase },
    StationStarted { station: Station, expected: i64 },
    PageWritten { station: StationId, page: u64, rows: u64 },
    StationVerified(CountCheck),
    StationMismatch(CountCheck),
    /// Counts matched but a row differs between the stores.
    StationValueMismatch {
        station: StationId,
        name: String,
        detail: String,
    },
}

/// Sender half handed to the orchestrator.
pub type ProgressSender = mpsc::UnboundedSender<MigrationEvent>;

/// Decides whether the run may touch the destination.
pub trait Confirm: Send {
    fn confirm(&mut self, manifest: &Manifest) -> Result<bool>;
}

impl<F> Confirm for F
where
    F: FnMut(&Manifest) -> Result<bool> + Send,
{
    fn confirm(&mut self, manifest: &Manifest) -> Result<bool> {
        self(manifest)
    }
}
