//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the calibration table.
pub const CONFIGS_TABLE: &str = "configs";

/// Initialize the shared part of the schema.
///
/// The measurements table is created separately by
/// [`ensure_measurement_table`] because its name is per store.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Check that `table` is safe to splice into SQL and does not collide with
/// the bookkeeping tables.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    let reserved = table.eq_ignore_ascii_case(CONFIGS_TABLE)
        || table.eq_ignore_ascii_case("schema_version")
        || table.to_ascii_lowercase().starts_with("sqlite_");

    if valid_start && valid_rest && !reserved {
        Ok(())
    } else {
        Err(Error::InvalidTable(table.to_string()))
    }
}

/// Create the measurements table `table` and its index if missing.
pub fn ensure_measurement_table(conn: &Connection, table: &str) -> Result<()> {
    validate_table_name(table)?;
    // config_id has no foreign key: replicated rows keep the id of the
    // calibration row on the device they came from.
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts INTEGER NOT NULL,
            raw INTEGER NOT NULL,
            config_id INTEGER NOT NULL CHECK (config_id > 0)
        );
        CREATE INDEX IF NOT EXISTS "idx_{table}_ts" ON "{table}"(ts);
        "#
    ))?;
    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Calibration history; rows are only ever appended
        CREATE TABLE IF NOT EXISTS configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at INTEGER NOT NULL,
            g_factor REAL NOT NULL CHECK (g_factor != 0),
            raw_offset REAL NOT NULL
        );
        "#,
    )?;

    Ok(())
}

fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    // if old_version < 2 { migrate_to_v2(conn)?; }
    let _ = old_version;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
