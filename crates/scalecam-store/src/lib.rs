//! SQLite persistence for scalecam measurements.
//!
//! A [`Store`] holds an append-only table of raw load-cell samples and a
//! `configs` table of calibration pairs. Every sample references the
//! calibration that was active when it was taken, so weights can be
//! recomputed later.
//!
//! # Example
//!
//! ```no_run
//! use scalecam_store::Store;
//! use scalecam_types::Timestamp;
//!
//! let store = Store::open("scale.db", "measurements")?;
//! let config_id = store.ensure_config(-10.97, -35_800.0)?;
//! store.insert(Timestamp::now(), -41_250, config_id)?;
//!
//! let rows = store.range(None, None, Some(100))?;
//! # Ok::<(), scalecam_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{ExportRecord, MeasurementStats};
pub use queries::{DEFAULT_RANGE_LIMIT, MeasurementQuery};
pub use schema::validate_table_name;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/scalecam/scalecam.db`
/// - macOS: `~/Library/Application Support/scalecam/scalecam.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("scalecam")
        .join("scalecam.db")
}
