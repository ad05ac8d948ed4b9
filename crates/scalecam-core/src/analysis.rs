//! Offline weight series derived from stored measurements.
//!
//! The pipeline drops zero readings (the amplifier reports 0 when it
//! fails), takes a median of three raw values, converts to grams and then
//! tracks a short and a long rolling median of the weight in pounds. The
//! difference between the two isolates short visits from slow drift.

use serde::{Deserialize, Serialize};

use scalecam_types::{Calibration, Measurement, Timestamp};

use crate::error::{Error, Result};
use crate::smoothing::Smoother;

/// Window used to filter raw readings before conversion.
pub const RAW_FILTER_WINDOW: usize = 3;

/// Rolling windows for [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples in the short rolling median.
    pub short_window: usize,
    /// Samples in the long rolling median.
    pub long_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            short_window: 100,
            long_window: 5000,
        }
    }
}

/// One row of the derived series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightPoint {
    pub id: i64,
    pub ts: Timestamp,
    pub raw: i64,
    /// Median of this and the two previous non-zero raw readings.
    pub filtered_raw: f64,
    pub grams: f64,
    pub kilograms: f64,
    pub pounds: f64,
    /// `None` until `short_window` points have been seen.
    pub short_median: Option<f64>,
    /// `None` until `long_window` points have been seen.
    pub long_median: Option<f64>,
    /// `short_median - long_median`, when both exist.
    pub delta: Option<f64>,
}

/// Rolling median that yields nothing until its window is full.
struct Rolling(Smoother);

impl Rolling {
    fn new(window: usize) -> Result<Self> {
        Ok(Self(Smoother::new(window)?))
    }

    fn push(&mut self, value: f64) -> Result<Option<f64>> {
        self.0.append(value);
        if self.0.is_full() {
            self.0.median().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Derive the weight series for `rows`, which must be in timestamp order.
///
/// The first two non-zero rows only seed the raw filter and produce no
/// output.
pub fn analyze(
    rows: &[Measurement],
    calibration: &Calibration,
    config: &AnalysisConfig,
) -> Result<Vec<WeightPoint>> {
    if config.short_window == 0 || config.long_window == 0 {
        return Err(Error::invalid_config("analysis windows must be non-zero"));
    }

    let mut raw_filter = Rolling::new(RAW_FILTER_WINDOW)?;
    let mut short = Rolling::new(config.short_window)?;
    let mut long = Rolling::new(config.long_window)?;
    let mut points = Vec::with_capacity(rows.len());

    for row in rows.iter().filter(|r| r.raw != 0) {
        let Some(filtered_raw) = raw_filter.push(row.raw as f64)? else {
            continue;
        };

        let grams = calibration.grams(filtered_raw)?;
        let kilograms = calibration.kilograms(filtered_raw)?;
        let pounds = calibration.pounds(filtered_raw)?;
        let short_median = short.push(pounds)?;
        let long_median = long.push(pounds)?;

        points.push(WeightPoint {
            id: row.id,
            ts: row.ts,
            raw: row.raw,
            filtered_raw,
            grams,
            kilograms,
            pounds,
            short_median,
            long_median,
            delta: short_median.zip(long_median).map(|(s, l)| s - l),
        });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raws: &[i64]) -> Vec<Measurement> {
        raws.iter()
            .enumerate()
            .map(|(i, &raw)| Measurement {
                id: i as i64 + 1,
                ts: Timestamp::from_micros(i as i64 * 100_000),
                raw,
                config_id: 1,
            })
            .collect()
    }

    fn identity() -> Calibration {
        Calibration::new(1.0, 0.0).unwrap()
    }

    #[test]
    fn test_zero_readings_dropped_and_filter_seeded() {
        let input = rows(&[1000, 0, 2000, 3000, 0, 4000]);
        let points = analyze(&input, &identity(), &AnalysisConfig::default()).unwrap();

        // Non-zero: 1000, 2000, 3000, 4000; the first two seed the filter
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, 4);
        assert_eq!(points[0].filtered_raw, 2000.0);
        assert_eq!(points[1].id, 6);
        assert_eq!(points[1].filtered_raw, 3000.0);
    }

    #[test]
    fn test_spike_is_filtered() {
        let input = rows(&[500, 500, 90_000, 500, 500]);
        let points = analyze(&input, &identity(), &AnalysisConfig::default()).unwrap();
        assert!(points.iter().all(|p| p.grams == 500.0));
    }

    #[test]
    fn test_unit_conversions() {
        // g_factor -10, offset -35800: raw -40336 is 453 g
        let calibration = Calibration::new(-10.0, -35_800.0).unwrap();
        let input = rows(&[-40_336; 3]);
        let points = analyze(&input, &calibration, &AnalysisConfig::default()).unwrap();

        let p = &points[0];
        assert_eq!(p.grams, 453.0);
        assert!((p.kilograms - 0.453).abs() < 1e-9);
        assert!((p.pounds - 453.0 / 453.592).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_medians_and_delta() {
        let config = AnalysisConfig {
            short_window: 2,
            long_window: 4,
        };
        let lb = scalecam_types::GRAMS_PER_POUND;
        let input = rows(&[lb as i64; 7]);
        let points = analyze(&input, &identity(), &config).unwrap();

        assert_eq!(points.len(), 5);
        assert!(points[0].short_median.is_none());
        assert!(points[1].short_median.is_some());
        assert!(points[2].long_median.is_none());
        assert!(points[3].long_median.is_some());
        assert!(points[2].delta.is_none());
        let delta = points[4].delta.unwrap();
        assert!(delta.abs() < 1e-9);
    }

    #[test]
    fn test_delta_tracks_short_visit() {
        let config = AnalysisConfig {
            short_window: 3,
            long_window: 21,
        };
        let cat = (10.0 * scalecam_types::GRAMS_PER_POUND) as i64;
        let mut raws = vec![1; 25];
        raws.extend([cat; 8]);
        let points = analyze(&rows(&raws), &identity(), &config).unwrap();

        let last = points.last().unwrap();
        let delta = last.delta.unwrap();
        assert!(delta > 9.9 && delta < 10.1, "delta was {delta}");
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = AnalysisConfig {
            short_window: 0,
            long_window: 10,
        };
        assert!(matches!(
            analyze(&[], &identity(), &config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_serializes_as_json_line() {
        let input = rows(&[10, 10, 10]);
        let points = analyze(&input, &identity(), &AnalysisConfig::default()).unwrap();
        let line = serde_json::to_string(&points[0]).unwrap();
        assert!(line.contains("\"short_median\":null"));
        assert!(!line.contains('\n'));
    }
}
