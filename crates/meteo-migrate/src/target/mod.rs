//! SQLite target database operations.
//!
//! All writes go through one lazily-opened transaction that lives until the
//! next [`TargetStore::commit`]. Dropping or closing the target without a
//! commit rolls the buffered writes back, leaving the file as of the last
//! commit.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

use crate::config::{EntityMode, JournalMode, TargetConfig};
use crate::core::identifier::{quote_sqlite, SeriesTable};
use crate::core::model::{DataPoint, Station, StationId, Token};
use crate::core::traits::TargetStore;
use crate::error::{MigrateError, Result};

/// SQLite target implementation.
pub struct SqliteTarget {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    entity_mode: EntityMode,
    /// Series tables this target has provisioned or found; the only ones
    /// it will read or write.
    series: BTreeSet<SeriesTable>,
}

impl SqliteTarget {
    /// Open the destination, creating the file if absent.
    pub async fn open(config: &TargetConfig, entity_mode: EntityMode) -> Result<Self> {
        Self::connect(config, entity_mode, true).await
    }

    /// Open an existing destination. Fails if the file does not exist.
    pub async fn open_existing(config: &TargetConfig) -> Result<Self> {
        let mut target = Self::connect(config, EntityMode::Merge, false).await?;
        target.load_series().await?;
        Ok(target)
    }

    async fn connect(
        config: &TargetConfig,
        entity_mode: EntityMode,
        create_if_missing: bool,
    ) -> Result<Self> {
        let journal_mode = match config.journal_mode {
            JournalMode::Delete => SqliteJournalMode::Delete,
            JournalMode::Wal => SqliteJournalMode::Wal,
        };

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(create_if_missing)
            .journal_mode(journal_mode);

        // One writer, one connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| MigrateError::Connection {
                store: "SQLite destination",
                source,
            })?;

        info!("Opened SQLite destination: {}", config.path.display());

        Ok(Self {
            pool,
            tx: None,
            entity_mode,
            series: BTreeSet::new(),
        })
    }

    /// Path-only convenience used by tests and tools.
    pub async fn open_path(path: &Path, entity_mode: EntityMode) -> Result<Self> {
        let config = TargetConfig {
            path: path.to_path_buf(),
            ..Default::default()
        };
        Self::open(&config, entity_mode).await
    }

    /// Current transaction, started on first use after a commit.
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                debug!("Beginning destination transaction");
                self.pool
                    .begin()
                    .await
                    .map_err(|e| MigrateError::write(e, "beginning transaction"))?
            }
        };
        Ok(self.tx.insert(tx))
    }

    /// Register the series of every station already in the destination.
    async fn load_series(&mut self) -> Result<()> {
        let query = format!("SELECT \"id\" FROM {}", quote_sqlite("stations")?);
        let q = sqlx::query_scalar::<_, i64>(&query);
        let ids = match self.tx.as_mut() {
            Some(tx) => q.fetch_all(&mut **tx).await,
            None => q.fetch_all(&self.pool).await,
        }
        .map_err(|e| MigrateError::write(e, "reading existing stations"))?;

        self.series
            .extend(ids.into_iter().map(SeriesTable::for_station));
        debug!("Registered {} existing series tables", self.series.len());
        Ok(())
    }

    fn series_for(&self, station: StationId) -> Result<SeriesTable> {
        let table = SeriesTable::for_station(station);
        if self.series.contains(&table) {
            Ok(table)
        } else {
            Err(MigrateError::UnknownSeries(station))
        }
    }

    /// Map a failed insert to a uniqueness violation when that is what it was.
    fn insert_error(e: sqlx::Error, entity: &'static str, key: String) -> MigrateError {
        match &e {
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.message().contains("UNIQUE constraint failed") =>
            {
                MigrateError::UniquenessViolation { entity, key }
            }
            _ => MigrateError::write(e, format!("inserting {} {}", entity, key)),
        }
    }

    fn station_sql(&self) -> Result<String> {
        let table = quote_sqlite("stations")?;
        Ok(match self.entity_mode {
            EntityMode::Create => format!(
                "INSERT INTO {} (\"id\", \"name\", \"location\", \"description\") VALUES (?, ?, ?, ?)",
                table
            ),
            EntityMode::Merge => format!(
                "INSERT INTO {} (\"id\", \"name\", \"location\", \"description\") VALUES (?, ?, ?, ?) \
                 ON CONFLICT(\"id\") DO UPDATE SET \"name\" = excluded.\"name\", \
                 \"location\" = excluded.\"location\", \"description\" = excluded.\"description\"",
                table
            ),
        })
    }

    fn token_sql(&self) -> Result<String> {
        let table = quote_sqlite("tokens")?;
        Ok(match self.entity_mode {
            EntityMode::Create => {
                format!("INSERT INTO {} (\"token\", \"station\") VALUES (?, ?)", table)
            }
            EntityMode::Merge => format!(
                "INSERT INTO {} (\"token\", \"station\") VALUES (?, ?) \
                 ON CONFLICT(\"token\") DO UPDATE SET \"station\" = excluded.\"station\"",
                table
            ),
        })
    }

    fn row_to_data_point(
        row: &SqliteRow,
        station: StationId,
    ) -> std::result::Result<DataPoint, sqlx::Error> {
        Ok(DataPoint {
            timestamp: row.try_get("timestamp")?,
            station,
            temperature: row.try_get("temperature")?,
            humidity: row.try_get("humidity")?,
            pressure: row.try_get("pressure")?,
        })
    }
}

#[async_trait]
impl TargetStore for SqliteTarget {
    async fn prepare_schema(&mut self) -> Result<()> {
        let stations = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"id\" INT PRIMARY KEY, \"name\" VARCHAR(64), \"location\" TEXT, \"description\" TEXT)",
            quote_sqlite("stations")?
        );
        let tokens = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"token\" VARCHAR(32) PRIMARY KEY, \"station\" INT)",
            quote_sqlite("tokens")?
        );

        for (object, ddl) in [("stations", stations), ("tokens", tokens)] {
            debug!("Creating table if absent: {}", object);
            let q = sqlx::query(&ddl);
            match self.tx.as_mut() {
                Some(tx) => q.execute(&mut **tx).await,
                None => q.execute(&self.pool).await,
            }
            .map_err(|e| MigrateError::schema(e, object))?;
        }

        self.load_series().await
    }

    async fn insert_station(&mut self, station: &Station) -> Result<()> {
        let sql = self.station_sql()?;
        let table = SeriesTable::for_station(station.id);
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"timestamp\" INT PRIMARY KEY, \"temperature\" REAL, \"humidity\" REAL, \"pressure\" REAL)",
            table.quoted_sqlite()?
        );

        let tx = self.tx().await?;
        sqlx::query(&sql)
            .bind(station.id)
            .bind(&station.name)
            .bind(&station.location)
            .bind(&station.description)
            .execute(&mut **tx)
            .await
            .map_err(|e| Self::insert_error(e, "station", station.id.to_string()))?;

        sqlx::query(&ddl)
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrateError::schema(e, table.name()))?;

        self.series.insert(table);
        Ok(())
    }

    async fn insert_token(&mut self, token: &Token) -> Result<()> {
        let sql = self.token_sql()?;
        let tx = self.tx().await?;
        sqlx::query(&sql)
            .bind(&token.token)
            .bind(token.station)
            .execute(&mut **tx)
            .await
            .map_err(|e| Self::insert_error(e, "token", token.token.clone()))?;
        Ok(())
    }

    async fn upsert_data_point(&mut self, station: StationId, point: &DataPoint) -> Result<()> {
        let table = self.series_for(station)?;
        let sql = format!(
            "INSERT INTO {} (\"timestamp\", \"temperature\", \"humidity\", \"pressure\") VALUES (?, ?, ?, ?) \
             ON CONFLICT(\"timestamp\") DO UPDATE SET \"temperature\" = excluded.\"temperature\", \
             \"humidity\" = excluded.\"humidity\", \"pressure\" = excluded.\"pressure\"",
            table.quoted_sqlite()?
        );

        let tx = self.tx().await?;
        sqlx::query(&sql)
            .bind(point.timestamp)
            .bind(point.temperature)
            .bind(point.humidity)
            .bind(point.pressure)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                MigrateError::write(e, format!("writing {} at {}", table, point.timestamp))
            })?;
        Ok(())
    }

    async fn count_data_points(&mut self, station: StationId) -> Result<i64> {
        let table = self.series_for(station)?;
        let query = format!("SELECT COUNT(*) FROM {}", table.quoted_sqlite()?);

        // Inside an open transaction the connection is held by it
        let count = match self.tx.as_mut() {
            Some(tx) => sqlx::query_scalar::<_, i64>(&query).fetch_one(&mut **tx).await,
            None => sqlx::query_scalar::<_, i64>(&query).fetch_one(&self.pool).await,
        };
        count.map_err(|e| MigrateError::write(e, format!("counting rows of {}", table)))
    }

    async fn page_data_points(
        &mut self,
        station: StationId,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<DataPoint>> {
        let table = self.series_for(station)?;
        let query = format!(
            "SELECT \"timestamp\", \"temperature\", \"humidity\", \"pressure\" FROM {} \
             ORDER BY \"timestamp\" ASC LIMIT ? OFFSET ?",
            table.quoted_sqlite()?
        );
        // SQLite integers are signed
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        let q = sqlx::query(&query).bind(limit).bind(offset);
        let rows = match self.tx.as_mut() {
            Some(tx) => q.fetch_all(&mut **tx).await,
            None => q.fetch_all(&self.pool).await,
        }
        .map_err(|e| MigrateError::write(e, format!("reading back {}", table)))?;

        rows.iter()
            .map(|row| Self::row_to_data_point(row, station))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::write(e, format!("decoding rows of {}", table)))
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .map_err(|e| MigrateError::write(e, "committing"))?;
            debug!("Committed destination transaction");
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("Closing destination with uncommitted writes; rolling back");
            if let Err(e) = tx.rollback().await {
                warn!("Rollback failed: {}", e);
            }
        }
        self.pool.close().await;
    }
}
