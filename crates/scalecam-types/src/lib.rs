//! Shared types for the scalecam load-cell sampler and its replication.
//!
//! This crate is used by the edge sampler, the local store and the
//! aggregator, so the wire formats they exchange are defined once here.
//!
//! # Example
//!
//! ```
//! use scalecam_types::{Calibration, ClipName, MeasurementRow, Timestamp};
//!
//! let cal = Calibration::new(-10.97, -35_800.0).unwrap();
//! let lb = cal.pounds(-120_000.0).unwrap();
//! assert!(lb > 12.0);
//!
//! let clip = ClipName::parse("2024-01-02T153000.h264").unwrap();
//! assert_eq!(clip.with_extension("mp4").unwrap().as_str(), "2024-01-02T153000.mp4");
//!
//! let row = MeasurementRow { ts: Timestamp::from_micros(1), raw: -120_000, config_id: 1 };
//! assert_eq!(row.ts, Timestamp::from_micros(1));
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    Calibration, CalibrationConfig, ClipName, GRAMS_PER_POUND, Measurement, MeasurementRow,
    SCALE_GRAMS_PER_POUND, Timestamp,
};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::{Date, Month, PrimitiveDateTime, Time};

    fn datetime() -> impl Strategy<Value = PrimitiveDateTime> {
        (1970i32..=9999, 1u8..=12, 1u8..=28, 0u8..24, 0u8..60, 0u8..60).prop_map(
            |(y, m, d, h, min, s)| {
                let month = Month::try_from(m).unwrap();
                let date = Date::from_calendar_date(y, month, d).unwrap();
                PrimitiveDateTime::new(date, Time::from_hms(h, min, s).unwrap())
            },
        )
    }

    proptest! {
        /// Sorting clip names as strings must sort them by recording time.
        #[test]
        fn clip_name_order_is_chronological(a in datetime(), b in datetime()) {
            let na = ClipName::from_datetime(a.assume_utc(), "h264").unwrap();
            let nb = ClipName::from_datetime(b.assume_utc(), "h264").unwrap();
            prop_assert_eq!(na.cmp(&nb), a.cmp(&b));
            prop_assert_eq!(na.as_str().cmp(nb.as_str()), a.cmp(&b));
        }

        /// Arbitrary strings must never panic the clip name parser.
        #[test]
        fn clip_name_parse_never_panics(s in ".{0,40}") {
            let _ = ClipName::parse(&s);
        }

        /// Any accepted name round-trips through its parts.
        #[test]
        fn clip_name_parts_roundtrip(dt in datetime(), ext in "[a-z0-9]{1,5}") {
            let name = ClipName::from_datetime(dt.assume_utc(), &ext).unwrap();
            prop_assert_eq!(name.extension(), ext.as_str());
            prop_assert_eq!(name.recorded_at().unwrap(), dt);
        }

        /// Conversion never yields a non-finite weight for finite input.
        #[test]
        fn calibration_is_finite(
            g in prop_oneof![-1000.0f64..-0.001, 0.001f64..1000.0],
            offset in -1.0e7f64..1.0e7,
            raw in -1.0e7f64..1.0e7,
        ) {
            let cal = Calibration::new(g, offset).unwrap();
            let grams = cal.grams(raw).unwrap();
            prop_assert!(grams.is_finite());
            prop_assert_eq!(grams, grams.trunc());
        }
    }
}
