//! Run phases and the transitions allowed between them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::model::StationId;
use crate::error::{MigrateError, Result};

/// Where a migration run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "station")]
pub enum Phase {
    Disconnected,
    ConnectedSource,
    ManifestFetched,
    Confirmed,
    DestinationPrepared,
    StationsImported,
    TokensImported,
    DataPointsImported(StationId),
    Verified(StationId),
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Whether the pipeline may move from `self` to `next`.
    ///
    /// `ManifestFetched -> Done` is a dry run. `DataPointsImported(a) ->
    /// DataPointsImported(b)` skips past a station that failed verification
    /// under the continue policy.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;

        if next == Failed {
            return !self.is_terminal();
        }

        match (self, next) {
            (Disconnected, ConnectedSource)
            | (ConnectedSource, ManifestFetched)
            | (ManifestFetched, Confirmed)
            | (ManifestFetched, Done)
            | (Confirmed, DestinationPrepared)
            | (DestinationPrepared, StationsImported)
            | (StationsImported, TokensImported)
            | (TokensImported, Done)
            | (Verified(_), Done) => true,
            (TokensImported, DataPointsImported(_)) => true,
            (DataPointsImported(a), Verified(b)) => a == b,
            (DataPointsImported(a), DataPointsImported(b)) => a != b,
            (DataPointsImported(_), Done) => true,
            (Verified(a), DataPointsImported(b)) => a != b,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Disconnected => write!(f, "DISCONNECTED"),
            Phase::ConnectedSource => write!(f, "CONNECTED_SOURCE"),
            Phase::ManifestFetched => write!(f, "MANIFEST_FETCHED"),
            Phase::Confirmed => write!(f, "CONFIRMED"),
            Phase::DestinationPrepared => write!(f, "DESTINATION_PREPARED"),
            Phase::StationsImported => write!(f, "STATIONS_IMPORTED"),
            Phase::TokensImported => write!(f, "TOKENS_IMPORTED"),
            Phase::DataPointsImported(id) => write!(f, "DATAPOINTS_IMPORTED({})", id),
            Phase::Verified(id) => write!(f, "VERIFIED({})", id),
            Phase::Done => write!(f, "DONE"),
            Phase::Failed => write!(f, "FAILED"),
        }
    }
}

/// Current phase plus the record of every phase entered.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: Phase,
    history: Vec<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: Phase::Disconnected,
            history: vec![Phase::Disconnected],
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the pipeline does not allow.
    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(MigrateError::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Enter `Failed` unless the run already ended.
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = Phase::Failed;
            self.history.push(Phase::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_pipeline_is_accepted() {
        let mut tracker = PhaseTracker::new();
        for next in [
            Phase::ConnectedSource,
            Phase::ManifestFetched,
            Phase::Confirmed,
            Phase::DestinationPrepared,
            Phase::StationsImported,
            Phase::TokensImported,
            Phase::DataPointsImported(1),
            Phase::Verified(1),
            Phase::DataPointsImported(2),
            Phase::Verified(2),
            Phase::Done,
        ] {
            tracker.advance(next).unwrap();
        }
        assert_eq!(tracker.current(), Phase::Done);
        assert_eq!(tracker.history().len(), 12);
    }

    #[test]
    fn test_skipping_confirmation_is_rejected() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(Phase::ConnectedSource).unwrap();
        tracker.advance(Phase::ManifestFetched).unwrap();
        let err = tracker.advance(Phase::DestinationPrepared).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid phase transition: MANIFEST_FETCHED -> DESTINATION_PREPARED"
        );
        assert_eq!(tracker.current(), Phase::ManifestFetched);
    }

    #[test]
    fn test_verified_must_match_station() {
        assert!(Phase::DataPointsImported(3).can_transition_to(Phase::Verified(3)));
        assert!(!Phase::DataPointsImported(3).can_transition_to(Phase::Verified(4)));
        assert!(!Phase::Verified(3).can_transition_to(Phase::DataPointsImported(3)));
    }

    #[test]
    fn test_dry_run_and_continue_shortcuts() {
        assert!(Phase::ManifestFetched.can_transition_to(Phase::Done));
        assert!(Phase::DataPointsImported(1).can_transition_to(Phase::DataPointsImported(2)));
        assert!(Phase::DataPointsImported(1).can_transition_to(Phase::Done));
    }

    #[test]
    fn test_failed_reachable_only_from_non_terminal() {
        assert!(Phase::Disconnected.can_transition_to(Phase::Failed));
        assert!(Phase::Verified(1).can_transition_to(Phase::Failed));
        assert!(!Phase::Done.can_transition_to(Phase::Failed));

        let mut tracker = PhaseTracker::new();
        tracker.fail();
        tracker.fail();
        assert_eq!(tracker.history(), &[Phase::Disconnected, Phase::Failed]);
    }
}
