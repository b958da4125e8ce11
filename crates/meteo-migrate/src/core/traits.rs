//! Adapter traits the orchestrator is written against.
//!
//! - [`SourceStore`]: read-only access to the legacy store
//! - [`TargetStore`]: schema creation and buffered writes into the embedded store
//!
//! The orchestrator only ever calls these operations; it never issues SQL.

use async_trait::async_trait;

use super::model::{DataPoint, Station, StationId, Token};
use crate::error::Result;

/// Read access to the legacy store.
///
/// Implementations must return pages in a stable order for the duration of a
/// run: two calls with the same `offset` yield the same rows as long as nobody
/// writes to the source concurrently.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Diagnostic identity string of the connected server.
    async fn server_version(&self) -> Result<String>;

    /// All known stations; order is not significant.
    async fn list_stations(&self) -> Result<Vec<Station>>;

    /// All known tokens.
    async fn list_tokens(&self) -> Result<Vec<Token>>;

    /// Total rows in a station's series.
    async fn count_data_points(&self, station: StationId) -> Result<i64>;

    /// At most `limit` rows of a station's series, ascending by timestamp,
    /// starting at the `offset`-th row.
    async fn page_data_points(
        &self,
        station: StationId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DataPoint>>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// Write access to the embedded store.
///
/// Writes are buffered until [`TargetStore::commit`]; [`TargetStore::close`]
/// discards anything not yet committed.
#[async_trait]
pub trait TargetStore: Send {
    /// Ensure the station and token tables exist. Idempotent.
    async fn prepare_schema(&mut self) -> Result<()>;

    /// Write a station row and provision its series table if absent.
    async fn insert_station(&mut self, station: &Station) -> Result<()>;

    /// Write a token row.
    async fn insert_token(&mut self, token: &Token) -> Result<()>;

    /// Write one datapoint, replacing the measurements of an existing
    /// row with the same timestamp.
    async fn upsert_data_point(&mut self, station: StationId, point: &DataPoint) -> Result<()>;

    /// Write a page of datapoints. Returns the number of rows written.
    async fn upsert_data_points(&mut self, station: StationId, page: &[DataPoint]) -> Result<u64> {
        for point in page {
            self.upsert_data_point(station, point).await?;
        }
        Ok(page.len() as u64)
    }

    /// Row count of a station's series.
    async fn count_data_points(&mut self, station: StationId) -> Result<i64>;

    /// Read back a page of a station's series, ascending by timestamp.
    async fn page_data_points(
        &mut self,
        station: StationId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DataPoint>>;

    /// Make buffered writes durable.
    async fn commit(&mut self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Roll back uncommitted writes and release the connection.
    async fn close(&mut self);
}
