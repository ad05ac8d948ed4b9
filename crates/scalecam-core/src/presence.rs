//! Presence detection with hysteresis.
//!
//! A load inside the band `(low, high)` starts a recording. The recording
//! only ends once the load has stayed outside the band for longer than the
//! cool-down, so brief excursions (someone shifting their weight, a spike
//! from the sensor) do not split one visit into several clips.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use scalecam_core::{PresenceConfig, PresenceDetector, Transition};
//!
//! let mut detector = PresenceDetector::new(PresenceConfig::default()).unwrap();
//! let t0 = Instant::now();
//!
//! assert_eq!(detector.observe(30.0, t0), Some(Transition::Start));
//! assert_eq!(detector.observe(0.0, t0 + Duration::from_secs(5)), None);
//! assert_eq!(detector.observe(0.0, t0 + Duration::from_secs(16)), Some(Transition::Stop));
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Band and cool-down for presence detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Exclusive lower bound, in pounds.
    pub low: f64,
    /// Exclusive upper bound, in pounds.
    pub high: f64,
    /// How long the load must stay out of band before recording stops.
    #[serde(with = "secs")]
    pub cooldown: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            low: 12.0,
            high: 100.0,
            cooldown: Duration::from_secs(15),
        }
    }
}

impl PresenceConfig {
    /// Check the band is a non-empty finite interval.
    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low >= self.high {
            return Err(Error::invalid_config(format!(
                "presence band ({}, {}) must be a finite interval with low < high",
                self.low, self.high
            )));
        }
        Ok(())
    }

    /// Whether `pounds` lies strictly inside the band. NaN never does.
    pub fn in_band(&self, pounds: f64) -> bool {
        pounds > self.low && pounds < self.high
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Idle,
    Recording {
        /// Last time the load was seen inside the band.
        last_seen: Instant,
    },
}

/// A state change that the recording trigger must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Start,
    Stop,
}

impl Transition {
    /// Lowercase name, also the camera endpoint path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Idle/recording state machine fed with calibrated weights.
#[derive(Debug, Clone)]
pub struct PresenceDetector {
    config: PresenceConfig,
    state: PresenceState,
}

impl PresenceDetector {
    /// Create an idle detector.
    pub fn new(config: PresenceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: PresenceState::Idle,
        })
    }

    /// Feed one weight observed at `now`.
    pub fn observe(&mut self, pounds: f64, now: Instant) -> Option<Transition> {
        let in_band = self.config.in_band(pounds);

        match self.state {
            PresenceState::Idle if in_band => {
                info!("Load of {:.1} lb detected, start recording", pounds);
                self.state = PresenceState::Recording { last_seen: now };
                Some(Transition::Start)
            }
            PresenceState::Idle => None,
            PresenceState::Recording { .. } if in_band => {
                self.state = PresenceState::Recording { last_seen: now };
                None
            }
            PresenceState::Recording { last_seen } => {
                let absent = now.saturating_duration_since(last_seen);
                if absent > self.config.cooldown {
                    info!(
                        "Load gone for {:.1}s ({:.1} lb), stop recording",
                        absent.as_secs_f64(),
                        pounds
                    );
                    self.state = PresenceState::Idle;
                    Some(Transition::Stop)
                } else {
                    debug!("Out of band ({:.1} lb) for {:?}", pounds, absent);
                    None
                }
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, PresenceState::Recording { .. })
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }
}
