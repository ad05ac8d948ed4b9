//! Recording trigger for the camera service.
//!
//! The camera exposes `GET /start` and `GET /stop`. Calls are best-effort:
//! the sampler logs a failed call and carries on, and a missed start is
//! not retried until the next idle to recording transition.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::presence::Transition;

/// Something that starts and stops video capture.
#[async_trait]
pub trait RecordingTrigger: Send + Sync {
    /// Begin capturing.
    async fn start(&self) -> Result<()>;

    /// Stop capturing.
    async fn stop(&self) -> Result<()>;

    /// Dispatch a detector transition.
    async fn fire(&self, transition: Transition) -> Result<()> {
        match transition {
            Transition::Start => self.start().await,
            Transition::Stop => self.stop().await,
        }
    }
}

/// A trigger that only logs, for scales without a camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrigger;

#[async_trait]
impl RecordingTrigger for NoopTrigger {
    async fn start(&self) -> Result<()> {
        debug!("No camera configured, ignoring start");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        debug!("No camera configured, ignoring stop");
        Ok(())
    }
}

#[cfg(feature = "http-trigger")]
pub use http::HttpTrigger;

#[cfg(feature = "http-trigger")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use tracing::info;

    use super::RecordingTrigger;
    use crate::error::{Error, Result};
    use crate::presence::Transition;

    /// Default request timeout for camera calls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Calls `GET {base}/start` and `GET {base}/stop` on the camera service.
    #[derive(Debug, Clone)]
    pub struct HttpTrigger {
        client: Client,
        base_url: String,
    }

    impl HttpTrigger {
        /// Create a trigger for the camera at `base_url`
        /// (e.g. `http://localhost:9000`).
        pub fn new(base_url: &str) -> Result<Self> {
            Self::with_timeout(base_url, DEFAULT_TIMEOUT)
        }

        /// Create a trigger with a custom request timeout.
        pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
            let base_url = base_url.trim_end_matches('/').to_string();

            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(Error::invalid_config(format!(
                    "trigger URL must start with http:// or https://, got: {}",
                    base_url
                )));
            }

            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::invalid_config(format!("HTTP client: {}", e)))?;

            Ok(Self { client, base_url })
        }

        /// Get the base URL.
        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        async fn call(&self, transition: Transition) -> Result<()> {
            let url = format!("{}/{}", self.base_url, transition.as_str());
            let failed = |reason: String| Error::Trigger {
                action: transition.to_string(),
                reason,
            };

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| failed(format!("{} unreachable: {}", url, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(failed(format!("{} returned {}", url, status)));
            }

            info!("Camera {} acknowledged", transition);
            Ok(())
        }
    }

    #[async_trait]
    impl RecordingTrigger for HttpTrigger {
        async fn start(&self) -> Result<()> {
            self.call(Transition::Start).await
        }

        async fn stop(&self) -> Result<()> {
            self.call(Transition::Stop).await
        }
    }

}
