//! Migration orchestrator - main workflow coordinator.
//!
//! Drives one linear pipeline: fetch the manifest, gate on confirmation,
//! import stations and tokens, then page every station's series into the
//! destination and verify it before moving on.

mod events;
mod manifest;
mod phase;

pub use events::{Confirm, MigrationEvent, ProgressSender};
pub use manifest::{Manifest, ManifestEntry};
pub use phase::{Phase, PhaseTracker};

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DanglingTokenPolicy, MigrationConfig, MismatchPolicy, VerifyMode};
use crate::core::model::{StationId, Token};
use crate::core::traits::{SourceStore, TargetStore};
use crate::error::{MigrateError, Result};
use crate::source::MysqlSource;
use crate::verify::{self, CountCheck};

/// Migration orchestrator.
pub struct Orchestrator<S: SourceStore> {
    config: MigrationConfig,
    source: Arc<S>,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
    dry_run: bool,
    phases: PhaseTracker,
}

/// Per-station outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationReport {
    pub station: StationId,
    pub name: String,
    /// Manifest count.
    pub expected: i64,
    /// Destination count after the station's commit.
    pub imported: i64,
    /// Pages read from the source.
    pub pages: u64,
    pub verified: bool,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Version string reported by the source server.
    pub server_version: String,

    /// Stations in the manifest.
    pub stations_total: usize,

    /// Tokens in the manifest.
    pub tokens_total: usize,

    /// Datapoints the manifest expected across all stations.
    pub rows_expected: i64,

    /// Total rows transferred.
    pub rows_transferred: i64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// Per-station outcome, in import order.
    pub stations: Vec<StationReport>,

    /// Tokens bound to a station the manifest does not contain.
    pub dangling_tokens: Vec<Token>,
}

/// What the pipeline produced before the result is assembled.
struct RunSummary {
    manifest: Manifest,
    reports: Vec<StationReport>,
    status: &'static str,
}

impl Orchestrator<MysqlSource> {
    /// Connect to the source described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let source = MysqlSource::connect(&config.source).await?;
        Ok(Self::new(Arc::new(source), config.migration.clone()))
    }
}

impl<S: SourceStore> Orchestrator<S> {
    /// Create an orchestrator over an already connected source.
    pub fn new(source: Arc<S>, config: MigrationConfig) -> Self {
        Self {
            config,
            source,
            progress: None,
            cancel: CancellationToken::new(),
            dry_run: false,
            phases: PhaseTracker::new(),
        }
    }

    /// Set progress channel for updates.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop before the next page once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fetch and report the manifest without opening the destination.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn emit(&self, event: MigrationEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    fn enter(&mut self, phase: Phase) -> Result<()> {
        self.phases.advance(phase)?;
        debug!("Entered phase {}", phase);
        self.emit(MigrationEvent::PhaseEntered { phase });
        Ok(())
    }

    /// Run the migration.
    ///
    /// `open_target` is only called after confirmation, so a declined run
    /// never creates the destination file. Both stores are closed on every
    /// exit path; uncommitted destination writes are rolled back.
    pub async fn run<T, F, Fut>(
        mut self,
        confirm: &mut dyn Confirm,
        open_target: F,
    ) -> Result<MigrationResult>
    where
        T: TargetStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let mut target: Option<T> = None;
        let outcome = self.execute(confirm, open_target, &mut target).await;

        if let Some(mut target) = target {
            target.close().await;
        }
        self.source.close().await;

        let summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                self.phases.fail();
                self.emit(MigrationEvent::PhaseEntered {
                    phase: Phase::Failed,
                });
                error!("Migration failed: {}", e);
                return Err(e);
            }
        };

        // Build result
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred: i64 = summary.reports.iter().map(|r| r.imported).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as i64
        } else {
            0
        };

        let manifest = summary.manifest;
        let dangling_tokens = manifest.dangling_tokens().into_iter().cloned().collect();

        let result = MigrationResult {
            run_id,
            status: summary.status.to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            server_version: manifest.server_version,
            stations_total: manifest.stations.len(),
            tokens_total: manifest.tokens.len(),
            rows_expected: manifest.total,
            rows_transferred,
            rows_per_second,
            stations: summary.reports,
            dangling_tokens,
        };

        info!(
            "Migration {}: {} stations, {} tokens, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.stations_total,
            result.tokens_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );

        Ok(result)
    }

    async fn execute<T, F, Fut>(
        &mut self,
        confirm: &mut dyn Confirm,
        open_target: F,
        slot: &mut Option<T>,
    ) -> Result<RunSummary>
    where
        T: TargetStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.enter(Phase::ConnectedSource)?;

        info!("Phase 1: Fetching manifest from {} source", self.source.db_type());
        let manifest = Manifest::fetch(self.source.as_ref()).await?;
        info!(
            "Found {} stations, {} tokens, {} datapoints (server {})",
            manifest.stations.len(),
            manifest.tokens.len(),
            manifest.total,
            manifest.server_version
        );
        self.enter(Phase::ManifestFetched)?;
        self.emit(MigrationEvent::ManifestFetched(manifest.clone()));

        self.check_tokens(&manifest)?;

        if self.dry_run {
            info!("Dry run: stopping before the destination is opened");
            self.enter(Phase::Done)?;
            return Ok(RunSummary {
                manifest,
                reports: Vec::new(),
                status: "dry_run",
            });
        }

        // Nothing below may run without confirmation
        if !self.config.assume_yes && !confirm.confirm(&manifest)? {
            return Err(MigrateError::Aborted);
        }
        self.enter(Phase::Confirmed)?;

        info!("Phase 2: Preparing destination");
        let target = slot.insert(open_target().await?);
        target.prepare_schema().await?;
        self.enter(Phase::DestinationPrepared)?;

        info!("Phase 3: Importing stations and tokens");
        for entry in &manifest.stations {
            target.insert_station(&entry.station).await?;
        }
        target.commit().await?;
        self.enter(Phase::StationsImported)?;

        for token in &manifest.tokens {
            target.insert_token(token).await?;
        }
        target.commit().await?;
        self.enter(Phase::TokensImported)?;

        info!("Phase 4: Importing datapoints");
        let mut reports = Vec::with_capacity(manifest.stations.len());
        let mut failed = Vec::new();

        for entry in &manifest.stations {
            let station = &entry.station;
            self.emit(MigrationEvent::StationStarted {
                station: station.clone(),
                expected: entry.count,
            });

            let pages = self.import_series(target, station.id, entry.count).await?;
            self.enter(Phase::DataPointsImported(station.id))?;

            let check = verify::check_count(target, station, entry.count).await?;
            let mut report = StationReport {
                station: station.id,
                name: station.name.clone(),
                expected: check.expected,
                imported: check.actual,
                pages,
                verified: false,
            };

            let outcome = if !check.matches() {
                self.emit(MigrationEvent::StationMismatch(check.clone()));
                Err(check.mismatch_error())
            } else if self.config.verify == VerifyMode::Values {
                verify::verify_values(
                    self.source.as_ref(),
                    target,
                    station,
                    entry.count,
                    self.batch_size(),
                )
                .await
                .inspect_err(|e| {
                    if let MigrateError::ValueMismatch { detail, .. } = e {
                        self.emit(MigrationEvent::StationValueMismatch {
                            station: station.id,
                            name: station.name.clone(),
                            detail: detail.clone(),
                        });
                    }
                })
            } else {
                Ok(())
            };

            // Count and value mismatches follow the policy; anything else ends the run
            match outcome {
                Ok(()) => {}
                Err(
                    e @ (MigrateError::VerificationMismatch { .. }
                    | MigrateError::ValueMismatch { .. }),
                ) => match self.config.on_mismatch {
                    MismatchPolicy::Abort => return Err(e),
                    MismatchPolicy::Continue => {
                        warn!("{}: continuing past mismatch: {}", station.name, e);
                        failed.push(station.name.clone());
                        reports.push(report);
                        continue;
                    }
                },
                Err(e) => return Err(e),
            }

            report.verified = true;
            reports.push(report);
            self.enter(Phase::Verified(station.id))?;
            self.emit(MigrationEvent::StationVerified(check));
        }

        if !failed.is_empty() {
            return Err(MigrateError::MismatchedStations(failed));
        }

        self.enter(Phase::Done)?;
        Ok(RunSummary {
            manifest,
            reports,
            status: "completed",
        })
    }

    fn batch_size(&self) -> u64 {
        self.config.batch_size.max(1) as u64
    }

    /// Apply the dangling token policy before anything is written.
    fn check_tokens(&self, manifest: &Manifest) -> Result<()> {
        let dangling = manifest.dangling_tokens();
        for token in &dangling {
            warn!(
                "Token {} references station {} which is not in the source",
                token.token,
                token.station_label()
            );
        }

        match (self.config.dangling_tokens, dangling.first()) {
            (DanglingTokenPolicy::Reject, Some(token)) => Err(MigrateError::DanglingToken {
                token: token.token.clone(),
                station: token.station,
            }),
            _ => Ok(()),
        }
    }

    /// Page one station's series into the destination and commit it.
    /// Returns the number of pages read.
    async fn import_series<T>(
        &self,
        target: &mut T,
        station: StationId,
        expected: i64,
    ) -> Result<u64>
    where
        T: TargetStore,
    {
        let batch_size = self.batch_size();
        let total = u64::try_from(expected).unwrap_or(0);
        let mut offset = 0u64;
        let mut pages = 0u64;

        while offset < total {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, rolling back station {}", station);
                return Err(MigrateError::Cancelled);
            }

            let page = self
                .source
                .page_data_points(station, batch_size, offset)
                .await?;
            let rows = target.upsert_data_points(station, &page).await?;
            pages += 1;
            debug!(
                "Station {}: page {} at offset {} ({} rows)",
                station, pages, offset, rows
            );
            self.emit(MigrationEvent::PageWritten {
                station,
                page: pages,
                rows,
            });

            offset += batch_size;
        }

        target.commit().await?;
        Ok(pages)
    }

    /// Compare per-station counts between the source and an existing
    /// destination without writing anything.
    ///
    /// Every station is checked and reported; a station whose series is
    /// missing from the destination counts as zero rows.
    pub async fn validate<T, F, Fut>(self, open_target: F) -> Result<Vec<CountCheck>>
    where
        T: TargetStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self.validate_inner(open_target).await;
        self.source.close().await;
        let checks = outcome?;

        let failed: Vec<String> = checks
            .iter()
            .filter(|c| !c.matches())
            .map(|c| c.name.clone())
            .collect();
        if !failed.is_empty() {
            return Err(MigrateError::MismatchedStations(failed));
        }
        Ok(checks)
    }

    async fn validate_inner<T, F, Fut>(&self, open_target: F) -> Result<Vec<CountCheck>>
    where
        T: TargetStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let manifest = Manifest::fetch(self.source.as_ref()).await?;
        self.emit(MigrationEvent::ManifestFetched(manifest.clone()));

        let mut target = open_target().await?;
        let mut checks = Vec::with_capacity(manifest.stations.len());
        let mut outcome = Ok(());

        for entry in &manifest.stations {
            self.emit(MigrationEvent::StationStarted {
                station: entry.station.clone(),
                expected: entry.count,
            });
            let check = match verify::check_count(&mut target, &entry.station, entry.count).await {
                Ok(check) => check,
                Err(MigrateError::UnknownSeries(id)) => {
                    warn!("{}: series table missing from destination", entry.station.name);
                    CountCheck {
                        station: id,
                        name: entry.station.name.clone(),
                        expected: entry.count,
                        actual: 0,
                    }
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            };

            if check.matches() {
                info!("{}: {} rows (match)", check.name, check.actual);
                self.emit(MigrationEvent::StationVerified(check.clone()));
            } else {
                self.emit(MigrationEvent::StationMismatch(check.clone()));
            }
            checks.push(check);
        }

        target.close().await;
        outcome.map(|_| checks)
    }
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
