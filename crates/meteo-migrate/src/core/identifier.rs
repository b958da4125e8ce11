//! Identifier validation and quoting for SQL injection prevention.
//!
//! SQL identifiers (table names, column names) cannot be passed as parameters
//! in prepared statements - only data values can be parameterized. Per-station
//! series tables are therefore addressed through [`SeriesTable`], which derives
//! the table name from a numeric station id and quotes it for the dialect in
//! use. No identifier is ever built from free text.

use super::model::StationId;
use crate::error::{MigrateError, Result};

/// Maximum identifier length (MySQL limit, SQLite has none).
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Prefix shared by every per-station series table.
pub const SERIES_TABLE_PREFIX: &str = "station_";

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// Escapes backticks by doubling them and wraps in backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("stations")?, "`stations`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQLite identifier using double quotes.
///
/// ```ignore
/// assert_eq!(quote_sqlite("stations")?, "\"stations\"");
/// ```
pub fn quote_sqlite(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Name of the time-series table owned by one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesTable(StationId);

impl SeriesTable {
    pub fn for_station(station: StationId) -> Self {
        Self(station)
    }

    pub fn station(&self) -> StationId {
        self.0
    }

    /// Unquoted table name, e.g. `station_7`.
    pub fn name(&self) -> String {
        format!("{}{}", SERIES_TABLE_PREFIX, self.0)
    }

    pub fn quoted_mysql(&self) -> Result<String> {
        quote_mysql(&self.name())
    }

    pub fn quoted_sqlite(&self) -> Result<String> {
        quote_sqlite(&self.name())
    }
}

impl std::fmt::Display for SeriesTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("stations").is_ok());
        assert!(validate_identifier("station_12").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("tokens").unwrap(), "`tokens`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
    }

    #[test]
    fn test_quote_sqlite_escapes_double_quote() {
        assert_eq!(quote_sqlite("tokens").unwrap(), "\"tokens\"");
        assert_eq!(quote_sqlite("a\"b").unwrap(), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_sqlite_injection_safely_quoted() {
        let result = quote_sqlite("x\"; DROP TABLE stations;--").unwrap();
        assert_eq!(result, "\"x\"\"; DROP TABLE stations;--\"");
    }

    #[test]
    fn test_series_table_names() {
        let table = SeriesTable::for_station(7);
        assert_eq!(table.name(), "station_7");
        assert_eq!(table.quoted_mysql().unwrap(), "`station_7`");
        assert_eq!(table.quoted_sqlite().unwrap(), "\"station_7\"");
        assert_eq!(table.station(), 7);
    }

    #[test]
    fn test_series_table_negative_id_is_quoted() {
        let table = SeriesTable::for_station(-3);
        assert_eq!(table.quoted_sqlite().unwrap(), "\"station_-3\"");
    }
}
