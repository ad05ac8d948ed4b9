//! Edge sampling for the scalecam load-cell camera trigger.
//!
//! This crate turns raw load-cell readings into camera start/stop calls:
//!
//! - **Sources**: a Linux IIO (`hx711`) reader, a simulated scale and a
//!   scripted mock, all behind [`SampleSource`]
//! - **Smoothing**: a fixed-window median/mean [`Smoother`]
//! - **Presence**: a two-state [`PresenceDetector`] with a weight band and
//!   a cool-down before stopping
//! - **Trigger**: [`RecordingTrigger`] with an HTTP implementation for the
//!   camera service
//! - **Sampling loop**: [`Sampler`] persists every reading before acting on it
//! - **Analysis**: [`analyze`] derives a filtered weight series offline
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scalecam_core::{IioSource, NoopTrigger, Sampler, SamplerConfig};
//! use scalecam_store::Store;
//! use scalecam_types::Calibration;
//! use tokio::sync::Mutex;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Mutex::new(Store::open_default("measurements")?));
//!     let sampler = Sampler::new(
//!         Box::new(IioSource::hx711(0, 0)),
//!         store,
//!         Calibration::new(-10.97, -35_800.0)?,
//!         NoopTrigger,
//!         SamplerConfig::default(),
//!     )
//!     .await?;
//!
//!     let stats = sampler.run(CancellationToken::new()).await?;
//!     println!("{} samples", stats.samples);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod error;
pub mod guard;
pub mod mock;
pub mod presence;
pub mod retry;
pub mod sampler;
pub mod smoothing;
pub mod source;
pub mod trigger;

pub use analysis::{AnalysisConfig, WeightPoint, analyze};
pub use error::{Error, Result};
pub use guard::HardwareGuard;
pub use mock::{MockRead, MockSource, MockTrigger};
pub use presence::{PresenceConfig, PresenceDetector, PresenceState, Transition};
pub use retry::{RetryConfig, is_retryable, with_retry};
pub use sampler::{SampleOutcome, Sampler, SamplerConfig, SamplerStats};
pub use smoothing::Smoother;
pub use source::{IioSource, SampleSource, SimulatedSource, SimulationConfig};
#[cfg(feature = "http-trigger")]
pub use trigger::HttpTrigger;
pub use trigger::{NoopTrigger, RecordingTrigger};

// Re-export the data types used in this crate's API
pub use scalecam_types::{Calibration, Timestamp};
