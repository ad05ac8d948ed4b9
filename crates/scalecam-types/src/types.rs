//! Core types for scalecam sensor data.

use core::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::{ParseError, ParseResult};

/// Grams per avoirdupois pound.
pub const GRAMS_PER_POUND: f64 = 453.592;

/// Grams per pound on the edge scale's live readout.
pub const SCALE_GRAMS_PER_POUND: f64 = 454.0;

/// Format of the timestamp part of a clip file name (`2024-01-02T153000`).
const CLIP_STEM_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour][minute][second]");

/// Length of the timestamp part of a clip file name.
const CLIP_STEM_LEN: usize = 17;

/// A sample timestamp, stored as microseconds since the Unix epoch.
///
/// Microsecond resolution keeps consecutive samples at single-digit Hz
/// rates distinct, which the replication cursor relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from microseconds since the Unix epoch.
    #[must_use]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Microseconds since the Unix epoch.
    #[must_use]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Convert from an `OffsetDateTime`, truncating to whole microseconds.
    #[must_use]
    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        Self((dt.unix_timestamp_nanos() / 1_000) as i64)
    }

    /// Convert to a UTC `OffsetDateTime`.
    pub fn to_datetime(self) -> ParseResult<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000)
            .map_err(|e| ParseError::InvalidTimestamp(format!("{}: {}", self.0, e)))
    }

    /// Parse either an integer (microseconds) or an RFC 3339 date-time.
    ///
    /// ```
    /// use scalecam_types::Timestamp;
    ///
    /// assert_eq!(Timestamp::parse("1500").unwrap(), Timestamp::from_micros(1500));
    /// let ts = Timestamp::parse("1970-01-01T00:00:01Z").unwrap();
    /// assert_eq!(ts.as_micros(), 1_000_000);
    /// ```
    pub fn parse(s: &str) -> ParseResult<Self> {
        let s = s.trim();
        if let Ok(micros) = s.parse::<i64>() {
            return Ok(Self(micros));
        }
        OffsetDateTime::parse(s, &Rfc3339)
            .map(Self::from_datetime)
            .map_err(|e| ParseError::InvalidTimestamp(format!("'{}': {}", s, e)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime().ok().and_then(|dt| dt.format(&Rfc3339).ok()) {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}us", self.0),
        }
    }
}

impl FromStr for Timestamp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(dt: OffsetDateTime) -> Self {
        Self::from_datetime(dt)
    }
}

/// Name of a video clip file, `YYYY-MM-DDTHHMMSS.ext`.
///
/// Because the timestamp part is fixed-width, comparing names as strings
/// orders clips chronologically. Names never contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct ClipName(String);

impl ClipName {
    /// Validate a clip file name.
    ///
    /// ```
    /// use scalecam_types::ClipName;
    ///
    /// let name = ClipName::parse("2024-01-02T153000.h264").unwrap();
    /// assert_eq!(name.extension(), "h264");
    /// assert!(ClipName::parse("../etc/passwd").is_err());
    /// ```
    pub fn parse(name: &str) -> ParseResult<Self> {
        if name.contains(['/', '\\']) {
            return Err(ParseError::clip(name, "contains a path separator"));
        }
        let Some((stem, ext)) = name.split_once('.') else {
            return Err(ParseError::clip(name, "missing extension"));
        };
        if stem.len() != CLIP_STEM_LEN {
            return Err(ParseError::clip(
                name,
                format!("timestamp part must be {} characters", CLIP_STEM_LEN),
            ));
        }
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseError::clip(name, "invalid extension"));
        }
        PrimitiveDateTime::parse(stem, CLIP_STEM_FORMAT)
            .map_err(|e| ParseError::clip(name, e.to_string()))?;
        Ok(Self(name.to_string()))
    }

    /// Build the name of a clip recorded at `dt`.
    pub fn from_datetime(dt: OffsetDateTime, extension: &str) -> ParseResult<Self> {
        let stem = dt
            .format(CLIP_STEM_FORMAT)
            .map_err(|e| ParseError::InvalidTimestamp(e.to_string()))?;
        Self::parse(&format!("{}.{}", stem, extension))
    }

    /// The full file name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The timestamp part of the name.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.0[..CLIP_STEM_LEN]
    }

    /// The extension, without the leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.0[CLIP_STEM_LEN + 1..]
    }

    /// The same clip with a different extension (e.g. the transcoded `.mp4`).
    pub fn with_extension(&self, extension: &str) -> ParseResult<Self> {
        Self::parse(&format!("{}.{}", self.stem(), extension))
    }

    /// When the clip was recorded (camera local time, no offset).
    pub fn recorded_at(&self) -> ParseResult<PrimitiveDateTime> {
        PrimitiveDateTime::parse(self.stem(), CLIP_STEM_FORMAT)
            .map_err(|e| ParseError::clip(&self.0, e.to_string()))
    }
}

impl fmt::Display for ClipName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClipName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClipName {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClipName> for String {
    fn from(name: ClipName) -> Self {
        name.0
    }
}

/// Linear transform from raw ADC units to grams.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Calibration {
    /// Raw units per gram. Never zero.
    pub g_factor: f64,
    /// Raw reading of the empty scale.
    pub raw_offset: f64,
}

impl Calibration {
    /// Create a calibration, rejecting a zero or non-finite factor and a
    /// non-finite offset.
    pub fn new(g_factor: f64, raw_offset: f64) -> ParseResult<Self> {
        if !g_factor.is_finite() || g_factor == 0.0 {
            return Err(ParseError::InvalidCalibration(format!(
                "g_factor must be a non-zero number, got {}",
                g_factor
            )));
        }
        if !raw_offset.is_finite() {
            return Err(ParseError::InvalidCalibration(format!(
                "raw_offset must be a finite number, got {}",
                raw_offset
            )));
        }
        Ok(Self {
            g_factor,
            raw_offset,
        })
    }

    /// Whole grams for a raw reading (truncated toward zero).
    ///
    /// ```
    /// use scalecam_types::Calibration;
    ///
    /// let cal = Calibration::new(-10.0, -35_800.0).unwrap();
    /// assert_eq!(cal.grams(-45_800.0).unwrap(), 1000.0);
    /// ```
    pub fn grams(&self, raw: f64) -> ParseResult<f64> {
        let grams = ((raw - self.raw_offset) / self.g_factor).trunc();
        if grams.is_finite() {
            Ok(grams)
        } else {
            Err(ParseError::InvalidCalibration(format!(
                "raw value {} does not convert to a finite weight",
                raw
            )))
        }
    }

    /// Kilograms for a raw reading.
    pub fn kilograms(&self, raw: f64) -> ParseResult<f64> {
        Ok(self.grams(raw)? / 1000.0)
    }

    /// Pounds for a raw reading.
    pub fn pounds(&self, raw: f64) -> ParseResult<f64> {
        Ok(self.grams(raw)? / GRAMS_PER_POUND)
    }

    /// Pounds as the edge scale reports them: 454 g to the pound,
    /// truncated to hundredths. Presence thresholds are set against these.
    ///
    /// ```
    /// use scalecam_types::Calibration;
    ///
    /// let cal = Calibration::new(1.0, 0.0).unwrap();
    /// assert_eq!(cal.scale_pounds(13_619.0).unwrap(), 29.99);
    /// ```
    pub fn scale_pounds(&self, raw: f64) -> ParseResult<f64> {
        Ok((self.grams(raw)? * 100.0 / SCALE_GRAMS_PER_POUND).trunc() / 100.0)
    }
}

/// A versioned calibration row.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConfig {
    /// Row id, increasing with creation order.
    pub id: i64,
    /// When the row was created.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
    /// Raw units per gram.
    pub g_factor: f64,
    /// Raw reading of the empty scale.
    pub raw_offset: f64,
}

impl CalibrationConfig {
    /// The transform this row describes.
    pub fn calibration(&self) -> ParseResult<Calibration> {
        Calibration::new(self.g_factor, self.raw_offset)
    }

    /// Whether this row holds exactly the given pair.
    #[must_use]
    pub fn matches(&self, g_factor: f64, raw_offset: f64) -> bool {
        self.g_factor == g_factor && self.raw_offset == raw_offset
    }
}

/// A persisted sample.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Store-local row id.
    pub id: i64,
    /// When the sample was taken.
    pub ts: Timestamp,
    /// Raw ADC reading.
    pub raw: i64,
    /// Calibration row in effect when the sample was written.
    pub config_id: i64,
}

impl Measurement {
    /// The wire representation, without the store-local id.
    #[must_use]
    pub fn to_row(&self) -> MeasurementRow {
        MeasurementRow {
            ts: self.ts,
            raw: self.raw,
            config_id: self.config_id,
        }
    }
}

/// A measurement as exchanged between stores: `[ts, raw, config_id]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "(Timestamp, i64, i64)", into = "(Timestamp, i64, i64)")
)]
pub struct MeasurementRow {
    pub ts: Timestamp,
    pub raw: i64,
    pub config_id: i64,
}

impl From<(Timestamp, i64, i64)> for MeasurementRow {
    fn from((ts, raw, config_id): (Timestamp, i64, i64)) -> Self {
        Self { ts, raw, config_id }
    }
}

impl From<MeasurementRow> for (Timestamp, i64, i64) {
    fn from(row: MeasurementRow) -> Self {
        (row.ts, row.raw, row.config_id)
    }
}
