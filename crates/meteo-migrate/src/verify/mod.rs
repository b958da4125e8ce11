//! Post-import verification of a station's series.
//!
//! Two levels:
//!
//! - **Count**: the destination row count equals the manifest count
//! - **Values**: both series are re-read page by page and every
//!   `(timestamp, temperature, humidity, pressure)` tuple compared
//!
//! The manifest count is the baseline; the source is never re-counted.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::model::{Station, StationId};
use crate::core::traits::{SourceStore, TargetStore};
use crate::error::{MigrateError, Result};

/// Outcome of comparing one station's counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCheck {
    pub station: StationId,
    pub name: String,
    /// Rows the manifest recorded in the source.
    pub expected: i64,
    /// Rows found in the destination.
    pub actual: i64,
}

impl CountCheck {
    pub fn matches(&self) -> bool {
        self.expected == self.actual
    }

    /// The error reported when this check fails.
    pub fn mismatch_error(&self) -> MigrateError {
        MigrateError::VerificationMismatch {
            station: self.station,
            name: self.name.clone(),
            expected: self.expected,
            actual: self.actual,
        }
    }
}

/// Count the station's destination rows against the manifest.
pub async fn check_count<T>(target: &mut T, station: &Station, expected: i64) -> Result<CountCheck>
where
    T: TargetStore + ?Sized,
{
    let actual = target.count_data_points(station.id).await?;
    let check = CountCheck {
        station: station.id,
        name: station.name.clone(),
        expected,
        actual,
    };

    if check.matches() {
        debug!("{}: {} rows (match)", station.name, actual);
    } else {
        warn!(
            "{}: source={} target={} (MISMATCH)",
            station.name, expected, actual
        );
    }
    Ok(check)
}

/// Compare every datapoint of a station in both stores.
///
/// Runs after the count check has passed, so both sides hold `expected`
/// rows and are paged with the same ascending timestamp order.
pub async fn verify_values<S, T>(
    source: &S,
    target: &mut T,
    station: &Station,
    expected: i64,
    batch_size: u64,
) -> Result<()>
where
    S: SourceStore + ?Sized,
    T: TargetStore + ?Sized,
{
    let mismatch = |detail: String| MigrateError::ValueMismatch {
        station: station.id,
        name: station.name.clone(),
        detail,
    };

    let total = u64::try_from(expected).unwrap_or(0);
    let mut offset = 0u64;
    while offset < total {
        let left = source
            .page_data_points(station.id, batch_size, offset)
            .await?;
        let right = target
            .page_data_points(station.id, batch_size, offset)
            .await?;

        if left.len() != right.len() {
            return Err(mismatch(format!(
                "page at offset {} has {} source rows but {} destination rows",
                offset,
                left.len(),
                right.len()
            )));
        }

        for (i, (src, dst)) in left.iter().zip(&right).enumerate() {
            if src.values() != dst.values() {
                return Err(mismatch(format!(
                    "row {} differs: source {:?}, destination {:?}",
                    offset + i as u64,
                    src.values(),
                    dst.values()
                )));
            }
        }

        offset += batch_size;
    }

    info!("{}: {} rows verified by value", station.name, total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntityMode;
    use crate::core::model::DataPoint;
    use crate::source::memory::MemorySource;
    use crate::target::SqliteTarget;

    async fn populated_target(
        dir: &tempfile::TempDir,
        source: &MemorySource,
        station: &Station,
    ) -> SqliteTarget {
        let mut target = SqliteTarget::open_path(&dir.path().join("meteo.db"), EntityMode::Merge)
            .await
            .unwrap();
        target.prepare_schema().await.unwrap();
        target.insert_station(station).await.unwrap();
        target
            .upsert_data_points(station.id, source.rows(station.id))
            .await
            .unwrap();
        target.commit().await.unwrap();
        target
    }

    #[test]
    fn test_mismatch_error_carries_both_counts() {
        let bad = CountCheck {
            station: 1,
            name: "Rooftop".into(),
            expected: 10,
            actual: 9,
        };
        assert!(!bad.matches());
        match bad.mismatch_error() {
            MigrateError::VerificationMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_check_count_reports_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new().with_station(1, "Rooftop", 25);
        let station = source.list_stations().await.unwrap().remove(0);
        let mut target = populated_target(&dir, &source, &station).await;

        let check = check_count(&mut target, &station, 25).await.unwrap();
        assert!(check.matches());

        let check = check_count(&mut target, &station, 26).await.unwrap();
        assert!(!check.matches());
        assert_eq!(check.expected, 26);
        assert_eq!(check.actual, 25);
        target.close().await;
    }

    #[tokio::test]
    async fn test_verify_values_passes_on_identical_series() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new().with_station(2, "Garden", 23);
        let station = source.list_stations().await.unwrap().remove(0);
        let mut target = populated_target(&dir, &source, &station).await;

        verify_values(&source, &mut target, &station, 23, 5)
            .await
            .unwrap();
        assert_eq!(source.pages_for(2), 5);
        target.close().await;
    }

    #[tokio::test]
    async fn test_verify_values_detects_changed_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new().with_station(2, "Garden", 12);
        let station = source.list_stations().await.unwrap().remove(0);
        let mut target = populated_target(&dir, &source, &station).await;

        let mut altered: DataPoint = source.rows(2)[7];
        altered.humidity += 1.0;
        target.upsert_data_point(2, &altered).await.unwrap();
        target.commit().await.unwrap();

        let err = verify_values(&source, &mut target, &station, 12, 5)
            .await
            .unwrap_err();
        match err {
            MigrateError::ValueMismatch { station, detail, .. } => {
                assert_eq!(station, 2);
                assert!(detail.contains("row 7"), "detail was: {detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
        target.close().await;
    }
}
