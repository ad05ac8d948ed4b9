//! The edge sampling loop.
//!
//! Each tick reads one raw value, persists it, smooths it, converts it to
//! pounds and feeds the presence detector. Persisting happens before any
//! trigger decision so the log is complete even when the camera is down.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scalecam_store::Store;
use scalecam_types::{Calibration, Timestamp};

use crate::error::{Error, Result};
use crate::guard::HardwareGuard;
use crate::presence::{PresenceConfig, PresenceDetector, Transition};
use crate::retry::{RetryConfig, with_retry};
use crate::smoothing::Smoother;
use crate::source::SampleSource;
use crate::trigger::RecordingTrigger;

/// Settings for the sampling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Time between reads, in milliseconds.
    pub interval_ms: u64,
    /// Median window applied to raw values before calibration.
    pub smoothing_window: usize,
    /// Presence band and cool-down.
    pub presence: PresenceConfig,
    /// Retry policy for writing a sample.
    pub persist_retry: RetryConfig,
    /// Give up after this many source errors in a row. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            smoothing_window: 3,
            presence: PresenceConfig::default(),
            persist_retry: RetryConfig::default(),
            max_consecutive_failures: None,
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// What happened to one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub ts: Timestamp,
    pub raw: i64,
    /// Whether the sample reached the store.
    pub persisted: bool,
    /// Smoothed weight, `None` when calibration failed.
    pub pounds: Option<f64>,
    /// Transition fired for this sample, if any.
    pub transition: Option<Transition>,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub samples: u64,
    pub persist_failures: u64,
    pub source_errors: u64,
    pub conversion_errors: u64,
    pub starts: u64,
    pub stops: u64,
    pub trigger_failures: u64,
}

/// Reads, persists and reacts to load-cell samples.
pub struct Sampler<T: RecordingTrigger> {
    source: HardwareGuard,
    store: Arc<Mutex<Store>>,
    config_id: i64,
    calibration: Calibration,
    smoother: Smoother,
    detector: PresenceDetector,
    trigger: T,
    config: SamplerConfig,
    stats: SamplerStats,
}

impl<T: RecordingTrigger> Sampler<T> {
    /// Build a sampler, recording `calibration` in the store if it changed.
    pub async fn new(
        source: Box<dyn SampleSource>,
        store: Arc<Mutex<Store>>,
        calibration: Calibration,
        trigger: T,
        config: SamplerConfig,
    ) -> Result<Self> {
        // Take the guard first so the source is released if setup fails
        let source = HardwareGuard::new(source);
        let smoother = Smoother::new(config.smoothing_window)?;
        let detector = PresenceDetector::new(config.presence.clone())?;
        let config_id = store
            .lock()
            .await
            .ensure_config(calibration.g_factor, calibration.raw_offset)?;

        info!(
            "Sampling {} with calibration {} (band {}..{} lb, cool-down {:?})",
            source.name(),
            config_id,
            config.presence.low,
            config.presence.high,
            config.presence.cooldown
        );

        Ok(Self {
            source,
            store,
            config_id,
            calibration,
            smoother,
            detector,
            trigger,
            config,
            stats: SamplerStats::default(),
        })
    }

    /// Calibration row referenced by new samples.
    pub fn config_id(&self) -> i64 {
        self.config_id
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    pub fn detector(&self) -> &PresenceDetector {
        &self.detector
    }

    /// Process one sample. Source errors are returned unchanged; everything
    /// after a successful read is handled here.
    pub async fn step(&mut self) -> Result<SampleOutcome> {
        let raw = match self.source.read().await {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.source_errors += 1;
                return Err(e);
            }
        };
        let ts = Timestamp::now();
        let now = Instant::now().into_std();
        self.stats.samples += 1;

        let persisted = self.persist(ts, raw).await;

        self.smoother.append(raw as f64);
        let pounds = match self.smoother.median() {
            Ok(median) => match self.calibration.scale_pounds(median) {
                Ok(lb) => Some(lb),
                Err(e) => {
                    self.stats.conversion_errors += 1;
                    warn!("Skipping trigger decision for raw {}: {}", raw, e);
                    None
                }
            },
            Err(e) => {
                warn!("Skipping trigger decision for raw {}: {}", raw, e);
                None
            }
        };

        let transition = match pounds {
            Some(lb) => self.detector.observe(lb, now),
            None => None,
        };
        if let Some(t) = transition {
            self.fire(t).await;
        }

        Ok(SampleOutcome {
            ts,
            raw,
            persisted,
            pounds,
            transition,
        })
    }

    async fn persist(&mut self, ts: Timestamp, raw: i64) -> bool {
        let store = &self.store;
        let config_id = self.config_id;
        let result = with_retry(&self.config.persist_retry, "persist sample", || async move {
            store
                .lock()
                .await
                .insert(ts, raw, config_id)
                .map_err(Error::from)
        })
        .await;

        match result {
            Ok(id) => {
                debug!("Stored sample {} (ts={}, raw={})", id, ts, raw);
                true
            }
            Err(e) => {
                self.stats.persist_failures += 1;
                error!(
                    "Sample lost: ts={} raw={} config_id={}: {}",
                    ts.as_micros(),
                    raw,
                    config_id,
                    e
                );
                false
            }
        }
    }

    async fn fire(&mut self, transition: Transition) {
        match transition {
            Transition::Start => self.stats.starts += 1,
            Transition::Stop => self.stats.stops += 1,
        }
        if let Err(e) = self.trigger.fire(transition).await {
            self.stats.trigger_failures += 1;
            warn!("{}", e);
        }
    }

    /// Sample until cancelled or the source fails for good.
    ///
    /// Cancellation is only observed between samples, so the sample in
    /// flight is always persisted. A recording in progress is stopped and
    /// the source released on the way out.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SamplerStats> {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures: u32 = 0;

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sampling cancelled");
                    break Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.step().await {
                Ok(_) => consecutive_failures = 0,
                Err(e) if e.is_fatal() => {
                    error!("Sampling stopped: {}", e);
                    break Err(e);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Read failed (failure {}/{}): {}",
                        consecutive_failures,
                        self.config
                            .max_consecutive_failures
                            .map_or("unlimited".to_string(), |n| n.to_string()),
                        e
                    );
                    if let Some(max) = self.config.max_consecutive_failures
                        && consecutive_failures >= max
                    {
                        break Err(Error::hardware(format!(
                            "{} consecutive read failures, last: {}",
                            consecutive_failures, e
                        )));
                    }
                }
            }
        };

        if self.detector.is_recording() {
            self.fire(Transition::Stop).await;
        }
        self.source.release();

        info!(
            "Sampler finished: {} samples, {} lost, {} source errors",
            self.stats.samples, self.stats.persist_failures, self.stats.source_errors
        );
        result.map(|()| self.stats.clone())
    }
}
