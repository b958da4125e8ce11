//! MySQL source database operations.
//!
//! Reads the legacy meteo schema: `stations`, `tokens` and one
//! `station_<id>` series table per station. Nothing here writes.

#[cfg(test)]
pub(crate) mod memory;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::{SourceConfig, SslMode};
use crate::core::identifier::{quote_mysql, SeriesTable};
use crate::core::model::{DataPoint, Station, StationId, Token};
use crate::core::traits::SourceStore;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL source reader.
///
/// Holds a single-connection pool: the migration never reads concurrently.
pub struct MysqlSource {
    pool: MySqlPool,
}

impl MysqlSource {
    /// Connect to the legacy database and check the connection.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let ssl_mode = match config.ssl_mode {
            SslMode::Disabled => MySqlSslMode::Disabled,
            SslMode::Preferred => MySqlSslMode::Preferred,
            SslMode::Required => MySqlSslMode::Required,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|source| MigrateError::Connection {
                store: "MySQL source",
                source,
            })?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|source| MigrateError::Connection {
                store: "MySQL source",
                source,
            })?;

        info!("Connected to MySQL source: {}", config.display_target());

        Ok(Self { pool })
    }

    fn row_to_station(row: &MySqlRow) -> std::result::Result<Station, sqlx::Error> {
        Ok(Station {
            id: row.try_get("id")?,
            name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
            location: row
                .try_get::<Option<String>, _>("location")?
                .unwrap_or_default(),
            description: row
                .try_get::<Option<String>, _>("description")?
                .unwrap_or_default(),
        })
    }

    fn row_to_data_point(
        row: &MySqlRow,
        station: StationId,
    ) -> std::result::Result<DataPoint, sqlx::Error> {
        Ok(DataPoint {
            timestamp: row.try_get("timestamp")?,
            station,
            temperature: Self::get_f64(row, "temperature")?,
            humidity: Self::get_f64(row, "humidity")?,
            pressure: Self::get_f64(row, "pressure")?,
        })
    }

    /// Legacy tables mix FLOAT and DOUBLE columns; widen FLOAT to f64.
    fn get_f64(row: &MySqlRow, column: &str) -> std::result::Result<f64, sqlx::Error> {
        row.try_get::<f64, _>(column)
            .or_else(|_| row.try_get::<f32, _>(column).map(f64::from))
    }
}

#[async_trait]
impl SourceStore for MysqlSource {
    async fn server_version(&self) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT CAST(VERSION() AS CHAR(255))")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::read(e, "reading server version"))
    }

    async fn list_stations(&self) -> Result<Vec<Station>> {
        // CAST text columns to CHAR to handle collation and BLOB-typed TEXT
        let query = format!(
            "SELECT CAST(`id` AS SIGNED) AS id, \
                    CAST(`name` AS CHAR) AS name, \
                    CAST(`location` AS CHAR) AS location, \
                    CAST(`description` AS CHAR) AS description \
             FROM {}",
            quote_mysql("stations")?
        );

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::read(e, "listing stations"))?;

        let stations = rows
            .iter()
            .map(Self::row_to_station)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::read(e, "decoding stations"))?;

        debug!("Fetched {} stations", stations.len());
        Ok(stations)
    }

    async fn list_tokens(&self) -> Result<Vec<Token>> {
        let query = format!(
            "SELECT CAST(`token` AS CHAR) AS token, CAST(`station` AS SIGNED) AS station FROM {}",
            quote_mysql("tokens")?
        );

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::read(e, "listing tokens"))?;

        let mut tokens = Vec::with_capacity(rows.len());
        for row in rows {
            let token = Token {
                token: row
                    .try_get("token")
                    .map_err(|e| MigrateError::read(e, "decoding tokens"))?,
                // Nullable in the legacy schema
                station: row
                    .try_get::<Option<StationId>, _>("station")
                    .map_err(|e| MigrateError::read(e, "decoding tokens"))?,
            };
            tokens.push(token);
        }

        debug!("Fetched {} tokens", tokens.len());
        Ok(tokens)
    }

    async fn count_data_points(&self, station: StationId) -> Result<i64> {
        let table = SeriesTable::for_station(station);
        let query = format!("SELECT COUNT(*) FROM {}", table.quoted_mysql()?);

        sqlx::query_scalar::<_, i64>(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::read(e, format!("counting rows of {}", table)))
    }

    async fn page_data_points(
        &self,
        station: StationId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DataPoint>> {
        let table = SeriesTable::for_station(station);
        let query = format!(
            "SELECT CAST(`timestamp` AS SIGNED) AS timestamp, `temperature`, `humidity`, `pressure` \
             FROM {} ORDER BY `timestamp` ASC LIMIT ? OFFSET ?",
            table.quoted_mysql()?
        );

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                MigrateError::read(e, format!("reading {} at offset {}", table, offset))
            })?;

        rows.iter()
            .map(|row| Self::row_to_data_point(row, station))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::read(e, format!("decoding rows of {}", table)))
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
