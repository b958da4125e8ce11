//! Pre-transfer snapshot of the source used as the verification baseline.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::model::{Station, StationId, Token};
use crate::core::traits::SourceStore;
use crate::error::Result;

/// One station with the row count the source reported for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub station: Station,
    pub count: i64,
}

/// What the source holds, read once before anything is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub server_version: String,
    pub stations: Vec<ManifestEntry>,
    pub tokens: Vec<Token>,
    /// Sum of all per-station counts.
    pub total: i64,
}

impl Manifest {
    /// Read version, stations, tokens and per-station counts from the source.
    pub async fn fetch<S>(source: &S) -> Result<Self>
    where
        S: SourceStore + ?Sized,
    {
        let server_version = source.server_version().await?;
        let stations = source.list_stations().await?;
        let tokens = source.list_tokens().await?;

        let mut entries = Vec::with_capacity(stations.len());
        let mut total = 0i64;
        for station in stations {
            let count = source.count_data_points(station.id).await?;
            debug!("{}: {} datapoints", station.name, count);
            total += count;
            entries.push(ManifestEntry { station, count });
        }

        Ok(Self {
            server_version,
            stations: entries,
            tokens,
            total,
        })
    }

    /// Count recorded for a station, if it is in the manifest.
    pub fn expected_for(&self, station: StationId) -> Option<i64> {
        self.stations
            .iter()
            .find(|e| e.station.id == station)
            .map(|e| e.count)
    }

    /// The station a token is bound to, when that station exists.
    pub fn station_for(&self, token: &Token) -> Option<&Station> {
        let id = token.station?;
        self.stations
            .iter()
            .map(|e| &e.station)
            .find(|s| s.id == id)
    }

    /// Tokens whose station is absent or not in the manifest.
    pub fn dangling_tokens(&self) -> Vec<&Token> {
        self.tokens
            .iter()
            .filter(|t| self.station_for(t).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::MemorySource;

    #[tokio::test]
    async fn test_fetch_records_counts_and_total() {
        let source = MemorySource::new()
            .with_station(1, "Rooftop", 2500)
            .with_station(2, "Garden", 750)
            .with_token("aaa", 1);

        let manifest = Manifest::fetch(&source).await.unwrap();
        assert_eq!(manifest.server_version, "memory-1.0");
        assert_eq!(manifest.stations.len(), 2);
        assert_eq!(manifest.expected_for(1), Some(2500));
        assert_eq!(manifest.expected_for(2), Some(750));
        assert_eq!(manifest.expected_for(3), None);
        assert_eq!(manifest.total, 3250);
        // The manifest does not read datapoints
        assert_eq!(source.pages_for(1), 0);
    }

    #[tokio::test]
    async fn test_token_lookup_and_dangling_tokens() {
        let source = MemorySource::new()
            .with_station(1, "Rooftop", 0)
            .with_token("aaa", 1)
            .with_token("bbb", 9);

        let manifest = Manifest::fetch(&source).await.unwrap();
        let bound = manifest.station_for(&manifest.tokens[0]).unwrap();
        assert_eq!(bound.name, "Rooftop");

        let dangling = manifest.dangling_tokens();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].token, "bbb");
    }

    #[tokio::test]
    async fn test_token_without_station_is_dangling() {
        let source = MemorySource::new()
            .with_station(1, "Rooftop", 0)
            .with_token("aaa", 1)
            .with_unbound_token("nobody");

        let manifest = Manifest::fetch(&source).await.unwrap();
        assert_eq!(manifest.tokens.len(), 2);
        assert!(manifest.station_for(&manifest.tokens[1]).is_none());

        let dangling = manifest.dangling_tokens();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].token, "nobody");
        assert_eq!(dangling[0].station, None);
    }
}
