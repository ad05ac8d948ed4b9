//! Provider API, replication aggregator and configuration for scalecam.
//!
//! An edge device runs the sampler and serves its store through the
//! provider API. An aggregator replicates any number of edge stores into
//! local databases and clip directories, using the newest local timestamp
//! and clip name as cursors.
//!
//! # Provider API
//!
//! - `GET /?from_ts=&to_ts=&limit=` - Measurement rows as `[ts, raw, config_id]`
//! - `GET /clips?from=<name>` - The next clip after `from`, or `204`
//! - `GET /api/health` - Service health check
//!
//! # Ingest API
//!
//! - `POST /ingest/{store}` - Rows pushed to an aggregator as `[[ts, raw, config_id], ...]`
//!
//! # Configuration
//!
//! The binary reads `~/.config/scalecam/scalecam.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [edge]
//! scale_factor = -10.97
//! offset = -35800
//! trigger_url = "http://127.0.0.1:8080"
//!
//! [edge.source]
//! kind = "iio"
//! device = 0
//! channel = 0
//!
//! [replication]
//! period_secs = 15
//! clip_budget = 5
//!
//! [[stores]]
//! data_dir = "/srv/scalecam"
//! db_file = "cats.db"
//! remote_host = "http://cats.local:8000"
//! scale_factor = -10.97
//! offset = -35800
//! clip_dir = "/srv/scalecam/cats"
//! clip_fps = 3
//! ```

pub mod api;
pub mod catchup;
pub mod config;
pub mod error;
pub mod remote;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod transcode;

pub use catchup::{
    ClipDownload, ClipSource, DataCatchupReport, FileCatchupReport, MeasurementSource, StopReason,
    catchup_data, catchup_files,
};
pub use config::{
    Config, ConfigError, EdgeConfig, ReplicationConfig, ServerConfig, SourceConfig, StoreConfig,
    ValidationError,
};
pub use error::{Error, Result};
pub use remote::RemoteStore;
pub use scheduler::{ReplicationStats, Replicator, Scheduler, TickReport};
pub use state::{AppState, IngestState};
pub use transcode::{FfmpegTranscoder, NoopTranscoder, Transcoder};
