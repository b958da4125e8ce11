//! Entities moved by the migration: stations, tokens and datapoints.

use serde::{Deserialize, Serialize};

/// Stable station identity shared by both stores.
pub type StationId = i64;

/// A physical monitoring unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub location: String,
    pub description: String,
}

impl Station {
    pub fn new(
        id: StationId,
        name: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            location: location.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:2}) {}, {}, {}",
            self.id, self.name, self.location, self.description
        )
    }
}

/// An access credential, normally bound to one station.
///
/// `station` is a plain lookup key and may be absent (a NULL in the legacy
/// column). Neither store enforces that the station exists; see
/// [`crate::orchestrator::Manifest::station_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub station: Option<StationId>,
}

impl Token {
    pub fn new(token: impl Into<String>, station: StationId) -> Self {
        Self {
            token: token.into(),
            station: Some(station),
        }
    }

    /// A token with no station reference at all.
    pub fn unbound(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            station: None,
        }
    }

    /// The referenced station for display, `NULL` when there is none.
    pub fn station_label(&self) -> String {
        station_label(&self.station)
    }
}

/// Render an optional station reference the way the legacy column shows it.
pub fn station_label(station: &Option<StationId>) -> String {
    match station {
        Some(id) => id.to_string(),
        None => "NULL".to_string(),
    }
}

/// One timestamped reading of a station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Primary key within the owning station's series.
    pub timestamp: i64,
    pub station: StationId,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

impl DataPoint {
    /// Measurement tuple used for value comparison.
    pub fn values(&self) -> (i64, f64, f64, f64) {
        (self.timestamp, self.temperature, self.humidity, self.pressure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_display() {
        let station = Station::new(1, "Rooftop", "Roof", "North corner");
        assert_eq!(station.to_string(), "( 1) Rooftop, Roof, North corner");
    }

    #[test]
    fn test_datapoint_values_ignore_station() {
        let a = DataPoint {
            timestamp: 10,
            station: 1,
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1013.2,
        };
        let b = DataPoint { station: 2, ..a };
        assert_eq!(a.values(), b.values());
        assert_ne!(a, b);
    }

    #[test]
    fn test_unbound_token_label() {
        assert_eq!(Token::new("abc", 4).station_label(), "4");
        let token = Token::unbound("abc");
        assert_eq!(token.station, None);
        assert_eq!(token.station_label(), "NULL");
    }
}
