//! Main store implementation.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use scalecam_types::{Calibration, CalibrationConfig, Measurement, MeasurementRow, Timestamp};

use crate::error::{Error, Result};
use crate::models::{ExportRecord, MeasurementStats};
use crate::queries::{DEFAULT_RANGE_LIMIT, MeasurementQuery};
use crate::schema;

/// How long a statement waits on another connection's lock before failing
/// with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store of measurements and calibration history.
///
/// The store owns its connection. Each database file should have a single
/// writer; readers (the provider API) may open their own connection.
pub struct Store {
    conn: Connection,
    table: String,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("table", &self.table).finish()
    }
}

impl Store {
    /// Open or create a database at the given path, keeping measurements in
    /// `table`.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let path = path.as_ref();
        schema::validate_table_name(table)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {} (table {})", path.display(), table);
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::with_connection(conn, table)
    }

    /// Open the default database location.
    pub fn open_default(table: &str) -> Result<Self> {
        Self::open(crate::default_db_path(), table)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(table: &str) -> Result<Self> {
        schema::validate_table_name(table)?;
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        schema::initialize(&conn)?;
        schema::ensure_measurement_table(&conn, table)?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    /// Name of the measurements table.
    pub fn table(&self) -> &str {
        &self.table
    }
}

// Calibration operations
impl Store {
    /// The most recently created calibration row.
    pub fn latest_config(&self) -> Result<Option<CalibrationConfig>> {
        let config = self
            .conn
            .query_row(
                "SELECT id, created_at, g_factor, raw_offset FROM configs
                 ORDER BY id DESC LIMIT 1",
                [],
                config_from_row,
            )
            .optional()?;
        Ok(config)
    }

    /// Get a calibration row by id.
    pub fn config_by_id(&self, id: i64) -> Result<Option<CalibrationConfig>> {
        let config = self
            .conn
            .query_row(
                "SELECT id, created_at, g_factor, raw_offset FROM configs WHERE id = ?",
                [id],
                config_from_row,
            )
            .optional()?;
        Ok(config)
    }

    /// All calibration rows, oldest first.
    pub fn list_configs(&self) -> Result<Vec<CalibrationConfig>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, g_factor, raw_offset FROM configs ORDER BY id ASC",
        )?;
        let configs = stmt
            .query_map([], config_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(configs)
    }

    /// Return the id of the calibration row for this pair, appending a new
    /// row when it differs from the latest one.
    ///
    /// Older rows are never reused: switching back to an earlier pair
    /// appends again so that ids follow the order calibrations took effect.
    pub fn ensure_config(&self, g_factor: f64, raw_offset: f64) -> Result<i64> {
        Calibration::new(g_factor, raw_offset)?;

        if let Some(latest) = self.latest_config()? {
            if latest.matches(g_factor, raw_offset) {
                debug!("Calibration unchanged (config {})", latest.id);
                return Ok(latest.id);
            }
        }

        self.conn.execute(
            "INSERT INTO configs (created_at, g_factor, raw_offset) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                OffsetDateTime::now_utc().unix_timestamp(),
                g_factor,
                raw_offset
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(
            "Recorded calibration {} (g_factor={}, raw_offset={})",
            id, g_factor, raw_offset
        );
        Ok(id)
    }
}

// Measurement operations
impl Store {
    /// Append one sample and return its id.
    pub fn insert(&self, ts: Timestamp, raw: i64, config_id: i64) -> Result<i64> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (ts, raw, config_id) VALUES (?1, ?2, ?3)",
                    self.table
                ),
                rusqlite::params![ts.as_micros(), raw, config_id],
            )
            .map_err(Error::Write)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Append a batch atomically. Returns the number of rows written.
    ///
    /// If any row is rejected the whole batch is rolled back and
    /// [`Error::BatchWrite`] names the offending row.
    pub fn write_all(&mut self, rows: &[MeasurementRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO \"{}\" (ts, raw, config_id) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            for (i, row) in rows.iter().enumerate() {
                if row.config_id <= 0 {
                    return Err(Error::BatchWrite {
                        row: i,
                        reason: format!("config_id must be positive, got {}", row.config_id),
                    });
                }
                stmt.execute(rusqlite::params![row.ts.as_micros(), row.raw, row.config_id])
                    .map_err(|e| Error::BatchWrite {
                        row: i,
                        reason: e.to_string(),
                    })?;
            }
        }
        tx.commit()?;

        debug!("Wrote batch of {} rows to {}", rows.len(), self.table);
        Ok(rows.len())
    }

    /// The newest sample timestamp, or `None` for an empty table.
    pub fn latest_timestamp(&self) -> Result<Option<Timestamp>> {
        let ts: Option<i64> = self.conn.query_row(
            &format!("SELECT MAX(ts) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(ts.map(Timestamp::from_micros))
    }

    /// Rows with `from_ts < ts <= to_ts`, ascending, at most `limit`
    /// (default [`DEFAULT_RANGE_LIMIT`]).
    pub fn range(
        &self,
        from_ts: Option<Timestamp>,
        to_ts: Option<Timestamp>,
        limit: Option<u32>,
    ) -> Result<Vec<MeasurementRow>> {
        let query = MeasurementQuery {
            after: from_ts,
            until: to_ts,
            limit: Some(limit.unwrap_or(DEFAULT_RANGE_LIMIT)),
            ..Default::default()
        };
        Ok(self.query(&query)?.iter().map(Measurement::to_row).collect())
    }

    /// Run a measurement query.
    pub fn query(&self, query: &MeasurementQuery) -> Result<Vec<Measurement>> {
        let sql = query.build_sql(&self.table);
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let measurements = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(Measurement {
                    id: row.get(0)?,
                    ts: Timestamp::from_micros(row.get(1)?),
                    raw: row.get(2)?,
                    config_id: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(measurements)
    }

    /// Number of stored samples.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Row count and time span of the table.
    pub fn stats(&self) -> Result<MeasurementStats> {
        let (count, first, last): (i64, Option<i64>, Option<i64>) = self.conn.query_row(
            &format!("SELECT COUNT(*), MIN(ts), MAX(ts) FROM \"{}\"", self.table),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(MeasurementStats {
            count: count as u64,
            first: first.map(Timestamp::from_micros),
            last: last.map(Timestamp::from_micros),
        })
    }
}

// Export
impl Store {
    /// Write the rows matching `query` as CSV and return how many were written.
    ///
    /// Weights use `calibration` when given, otherwise each row's own
    /// calibration from `configs`. Rows whose calibration is unknown (e.g.
    /// replicated from another device) get an empty weight column.
    pub fn export_csv<W: Write>(
        &self,
        query: &MeasurementQuery,
        calibration: Option<&Calibration>,
        writer: W,
    ) -> Result<usize> {
        let measurements = self.query(query)?;
        let mut known: HashMap<i64, Option<Calibration>> = HashMap::new();
        let mut wtr = csv::Writer::from_writer(writer);

        for m in &measurements {
            let row_calibration = match calibration {
                Some(c) => Some(*c),
                None => match known.get(&m.config_id) {
                    Some(c) => *c,
                    None => {
                        let c = self.calibration_for(m.config_id)?;
                        known.insert(m.config_id, c);
                        c
                    }
                },
            };
            wtr.serialize(ExportRecord::new(m, row_calibration.as_ref()))?;
        }
        wtr.flush()?;

        info!("Exported {} rows from {}", measurements.len(), self.table);
        Ok(measurements.len())
    }

    fn calibration_for(&self, config_id: i64) -> Result<Option<Calibration>> {
        let Some(config) = self.config_by_id(config_id)? else {
            return Ok(None);
        };
        match config.calibration() {
            Ok(c) => Ok(Some(c)),
            Err(e) => {
                warn!("Ignoring calibration {}: {}", config_id, e);
                Ok(None)
            }
        }
    }
}

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<CalibrationConfig> {
    let created_at: i64 = row.get(1)?;
    Ok(CalibrationConfig {
        id: row.get(0)?,
        created_at: OffsetDateTime::from_unix_timestamp(created_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e)))?,
        g_factor: row.get(2)?,
        raw_offset: row.get(3)?,
    })
}
