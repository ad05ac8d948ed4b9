//! Raw load-cell sample sources.
//!
//! The [`SampleSource`] trait abstracts over real hardware and simulated or
//! scripted sensors so the sampling loop can be tested without a scale.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A sensor producing raw ADC readings.
#[async_trait]
pub trait SampleSource: Send {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Take one raw reading.
    ///
    /// Errors that leave the sensor usable are [`Error::Transient`];
    /// [`Error::Hardware`] means no further reads can succeed.
    async fn read(&mut self) -> Result<i64>;

    /// Release the underlying hardware. Called exactly once by
    /// [`HardwareGuard`](crate::HardwareGuard).
    fn release(&mut self) {}
}

/// Reads a Linux Industrial I/O channel through sysfs.
///
/// The kernel `hx711` driver exposes the amplifier as
/// `/sys/bus/iio/devices/iio:deviceN/in_voltageC_raw`; each read of that
/// file triggers one conversion.
#[derive(Debug, Clone)]
pub struct IioSource {
    name: String,
    path: PathBuf,
}

impl IioSource {
    /// Read raw values from an arbitrary file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("iio:{}", path.display()),
            path,
        }
    }

    /// The raw value file of channel `channel` of IIO device `device`.
    pub fn hx711(device: u32, channel: u32) -> Self {
        Self::new(format!(
            "/sys/bus/iio/devices/iio:device{}/in_voltage{}_raw",
            device, channel
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SampleSource for IioSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&mut self) -> Result<i64> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    Error::hardware(format!("{}: {}", self.path.display(), e))
                }
                _ => Error::transient(format!("{}: {}", self.path.display(), e)),
            })?;

        text.trim()
            .parse::<i64>()
            .map_err(|e| Error::transient(format!("unparseable reading {:?}: {}", text.trim(), e)))
    }

    fn release(&mut self) {
        debug!("Released {}", self.path.display());
    }
}

/// Parameters for [`SimulatedSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Raw reading of the empty scale.
    pub baseline: i64,
    /// Peak-to-peak noise is twice this value.
    pub noise: i64,
    /// Raw change caused by a typical load.
    pub load: i64,
    /// Chance per sample that a load appears.
    pub event_probability: f64,
    /// Samples a load stays on the scale.
    pub event_samples: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            baseline: -35_800,
            noise: 150,
            // About 20 lb at g_factor -10.97
            load: -100_000,
            event_probability: 0.002,
            event_samples: 400,
        }
    }
}

/// A noisy scale that is occasionally stepped on.
#[derive(Debug)]
pub struct SimulatedSource {
    config: SimulationConfig,
    rng: StdRng,
    remaining: u32,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_os_rng(),
            remaining: 0,
        }
    }

    /// Deterministic source for tests.
    pub fn with_seed(config: SimulationConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            remaining: 0,
        }
    }
}

#[async_trait]
impl SampleSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read(&mut self) -> Result<i64> {
        let p = self.config.event_probability;
        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        if self.remaining == 0 && self.config.event_samples > 0 && self.rng.random_bool(p) {
            info!("Simulated load for {} samples", self.config.event_samples);
            self.remaining = self.config.event_samples;
        }

        let noise = self.config.noise.abs();
        let mut raw = self.config.baseline + self.rng.random_range(-noise..=noise);
        if self.remaining > 0 {
            self.remaining -= 1;
            raw += self.config.load;
        }
        Ok(raw)
    }
}
