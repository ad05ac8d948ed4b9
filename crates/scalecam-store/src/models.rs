//! Data models derived from stored measurements.

use serde::{Deserialize, Serialize};

use scalecam_types::{Calibration, Measurement, Timestamp};

/// Summary of a measurements table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementStats {
    /// Number of rows.
    pub count: u64,
    /// Oldest timestamp, if any rows exist.
    pub first: Option<Timestamp>,
    /// Newest timestamp, if any rows exist.
    pub last: Option<Timestamp>,
}

/// One line of a CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// RFC 3339 time of the sample.
    pub time: String,
    /// Microseconds since the Unix epoch.
    pub ts: i64,
    pub raw: i64,
    pub config_id: i64,
    /// Calibrated weight, empty when no calibration is known for the row.
    pub grams: Option<f64>,
}

impl ExportRecord {
    /// Build a record, converting with `calibration` when one applies.
    pub fn new(measurement: &Measurement, calibration: Option<&Calibration>) -> Self {
        Self {
            time: measurement.ts.to_string(),
            ts: measurement.ts.as_micros(),
            raw: measurement.raw,
            config_id: measurement.config_id,
            grams: calibration.and_then(|c| c.grams(measurement.raw as f64).ok()),
        }
    }
}
