//! In-memory source used by the orchestrator and verification tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::model::{DataPoint, Station, StationId, Token};
use crate::core::traits::SourceStore;
use crate::error::Result;

#[derive(Default)]
pub(crate) struct MemorySource {
    stations: Vec<Station>,
    tokens: Vec<Token>,
    series: BTreeMap<StationId, Vec<DataPoint>>,
    /// Reported count differing from the stored rows, per station.
    count_overrides: BTreeMap<StationId, i64>,
    /// Every (station, limit, offset) page request, in order.
    pub(crate) pages_served: Mutex<Vec<(StationId, u64, u64)>>,
    pub(crate) closed: AtomicBool,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a station with `rows` generated datapoints.
    pub(crate) fn with_station(mut self, id: StationId, name: &str, rows: usize) -> Self {
        self.stations
            .push(Station::new(id, name, format!("{} site", name), ""));
        let points = (0..rows)
            .map(|i| DataPoint {
                timestamp: 1_500_000_000 + (i as i64) * 60,
                station: id,
                temperature: 10.0 + (i % 50) as f64 * 0.5,
                humidity: 30.0 + (i % 40) as f64,
                pressure: 990.0 + (i % 30) as f64 * 1.5,
            })
            .collect();
        self.series.insert(id, points);
        self
    }

    pub(crate) fn with_token(mut self, token: &str, station: StationId) -> Self {
        self.tokens.push(Token::new(token, station));
        self
    }

    /// Add a token whose station column is NULL.
    pub(crate) fn with_unbound_token(mut self, token: &str) -> Self {
        self.tokens.push(Token::unbound(token));
        self
    }

    /// Report `count` for the station regardless of how many rows it holds.
    pub(crate) fn with_count_override(mut self, station: StationId, count: i64) -> Self {
        self.count_overrides.insert(station, count);
        self
    }

    pub(crate) fn rows(&self, station: StationId) -> &[DataPoint] {
        self.series.get(&station).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn pages_for(&self, station: StationId) -> usize {
        self.pages_served
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == station)
            .count()
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn server_version(&self) -> Result<String> {
        Ok("memory-1.0".to_string())
    }

    async fn list_stations(&self) -> Result<Vec<Station>> {
        Ok(self.stations.clone())
    }

    async fn list_tokens(&self) -> Result<Vec<Token>> {
        Ok(self.tokens.clone())
    }

    async fn count_data_points(&self, station: StationId) -> Result<i64> {
        Ok(self
            .count_overrides
            .get(&station)
            .copied()
            .unwrap_or(self.rows(station).len() as i64))
    }

    async fn page_data_points(
        &self,
        station: StationId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DataPoint>> {
        self.pages_served
            .lock()
            .unwrap()
            .push((station, limit, offset));
        Ok(self
            .rows(station)
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .copied()
            .collect())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
