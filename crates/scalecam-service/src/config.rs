//! Service configuration.
//!
//! One TOML file serves both roles: the edge device reads `[server]` and
//! `[edge]`, the aggregator reads `[replication]` and `[[stores]]`.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [edge]
//! data_dir = "/home/pi/data"
//! db_file = "weights.db"
//! scale_factor = -10.97
//! offset = -35800
//! trigger_url = "http://localhost:9000"
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
//! db_file = "weights.db"
//! remote_host = "http://cats.local:8000"
//! scale_factor = -10.97
//! offset = -35800
//! clip_dir = "/srv/scalecam/clips"
//! clip_fps = 3
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scalecam_core::{SamplerConfig, SimulationConfig};
use scalecam_types::{Calibration, ParseResult};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider API settings.
    pub server: ServerConfig,
    /// Edge sampling settings.
    pub edge: EdgeConfig,
    /// Aggregator schedule.
    pub replication: ReplicationConfig,
    /// Remote stores replicated by the aggregator.
    pub stores: Vec<StoreConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration, collecting every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use scalecam_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.edge.validate());
        errors.extend(self.replication.validate());

        // Each local database has exactly one writer
        let mut seen = HashSet::new();
        for (i, store) in self.stores.iter().enumerate() {
            let prefix = format!("stores[{}]", i);
            errors.extend(store.validate(&prefix));

            let key = (store.db_path(), store.db_table.clone());
            if !seen.insert(key) {
                errors.push(ValidationError::new(
                    format!("{}.db_file", prefix),
                    format!(
                        "table '{}' in {} is already replicated by another store",
                        store.db_table,
                        store.db_path().display()
                    ),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Provider API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
                Ok(_) => {}
            },
        }

        errors
    }
}

/// Where the edge sampler reads raw values from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A Linux IIO channel, e.g. the `hx711` driver.
    Iio { device: u32, channel: u32 },
    /// Any file holding one integer per read.
    File { path: PathBuf },
    /// Random noise with occasional loads.
    Simulated(SimulationConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Iio {
            device: 0,
            channel: 0,
        }
    }
}

/// Edge device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub db_table: String,
    /// Raw units per gram (`g_factor`).
    pub scale_factor: f64,
    /// Raw reading of the empty scale (`raw_offset`).
    pub offset: f64,
    /// Directory the camera writes clips to, served at `/clips`.
    pub clip_dir: PathBuf,
    /// Camera service base URL. Without one, transitions are only logged.
    pub trigger_url: Option<String>,
    pub source: SourceConfig,
    pub sampler: SamplerConfig,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            clip_dir: data_dir.join("clips"),
            data_dir,
            db_file: "weights.db".to_string(),
            db_table: "measurements".to_string(),
            scale_factor: -10.97,
            offset: -35_800.0,
            trigger_url: None,
            source: SourceConfig::default(),
            sampler: SamplerConfig::default(),
        }
    }
}

impl EdgeConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn calibration(&self) -> ParseResult<Calibration> {
        Calibration::new(self.scale_factor, self.offset)
    }

    /// Validate edge configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = validate_database("edge", &self.data_dir, &self.db_file, &self.db_table);
        errors.extend(validate_calibration("edge", self.scale_factor, self.offset));

        if let Some(url) = &self.trigger_url
            && !is_http_url(url)
        {
            errors.push(ValidationError::new(
                "edge.trigger_url",
                format!("'{}' must start with http:// or https://", url),
            ));
        }

        if self.clip_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "edge.clip_dir",
                "clip directory cannot be empty",
            ));
        }

        if let SourceConfig::File { path } = &self.source
            && path.as_os_str().is_empty()
        {
            errors.push(ValidationError::new(
                "edge.source.path",
                "source path cannot be empty",
            ));
        }

        if self.sampler.interval_ms == 0 {
            errors.push(ValidationError::new(
                "edge.sampler.interval_ms",
                "sampling interval must be at least 1 ms",
            ));
        }
        if self.sampler.smoothing_window == 0 {
            errors.push(ValidationError::new(
                "edge.sampler.smoothing_window",
                "smoothing window must hold at least one sample",
            ));
        }
        if let Err(e) = self.sampler.presence.validate() {
            errors.push(ValidationError::new("edge.sampler.presence", e.to_string()));
        }

        errors
    }
}

/// Aggregator schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Seconds between catchup passes for each store.
    pub period_secs: u64,
    /// Extra clips fetched per pass after the first. Omit for no limit.
    pub clip_budget: Option<u32>,
    /// Row cap per data request. Omit to use the provider's default.
    pub data_limit: Option<u32>,
    /// Upper bound on one store's pass, in seconds.
    pub tick_timeout_secs: u64,
    /// Timeout for each HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

/// Bounds for the replication period (1 second to 1 day).
pub const MIN_PERIOD_SECS: u64 = 1;
pub const MAX_PERIOD_SECS: u64 = 86_400;

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            period_secs: 15,
            clip_budget: Some(5),
            data_limit: None,
            tick_timeout_secs: 300,
            request_timeout_secs: 60,
        }
    }
}

impl ReplicationConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate replication configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&self.period_secs) {
            errors.push(ValidationError::new(
                "replication.period_secs",
                format!(
                    "period {} must be between {} and {} seconds",
                    self.period_secs, MIN_PERIOD_SECS, MAX_PERIOD_SECS
                ),
            ));
        }
        if self.data_limit == Some(0) {
            errors.push(ValidationError::new(
                "replication.data_limit",
                "row limit must be positive (omit it for the provider default)",
            ));
        }
        if self.tick_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "replication.tick_timeout_secs",
                "tick timeout cannot be 0",
            ));
        }
        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "replication.request_timeout_secs",
                "request timeout cannot be 0",
            ));
        }

        errors
    }
}

/// A remote store replicated into a local database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
    #[serde(default = "default_table")]
    pub db_table: String,
    /// Provider base URL, e.g. `http://cats.local:8000`.
    pub remote_host: String,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default)]
    pub offset: f64,
    /// Color used when charting this store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_color: Option<String>,
    /// Local clip directory. Clip replication is skipped without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_dir: Option<PathBuf>,
    /// Frame rate the remote camera records at.
    #[serde(default = "default_clip_fps")]
    pub clip_fps: u32,
    /// Convert downloaded `.h264` clips to `.mp4`.
    #[serde(default = "default_transcode")]
    pub transcode: bool,
}

fn default_table() -> String {
    "measurements".to_string()
}

fn default_scale_factor() -> f64 {
    1.0
}

fn default_clip_fps() -> u32 {
    30
}

fn default_transcode() -> bool {
    true
}

impl StoreConfig {
    /// Build a store configuration, failing fast on invalid values.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        db_file: impl Into<String>,
        db_table: impl Into<String>,
        remote_host: impl Into<String>,
        scale_factor: f64,
        offset: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            data_dir: data_dir.into(),
            db_file: db_file.into(),
            db_table: db_table.into(),
            remote_host: remote_host.into(),
            scale_factor,
            offset,
            plot_color: None,
            clip_dir: None,
            clip_fps: default_clip_fps(),
            transcode: default_transcode(),
        };

        let errors = config.validate("store");
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Replicate clips into `dir`, recorded at `fps`.
    pub fn with_clips(mut self, dir: impl Into<PathBuf>, fps: u32) -> Self {
        self.clip_dir = Some(dir.into());
        self.clip_fps = fps;
        self
    }

    pub fn with_transcode(mut self, transcode: bool) -> Self {
        self.transcode = transcode;
        self
    }

    pub fn with_plot_color(mut self, color: impl Into<String>) -> Self {
        self.plot_color = Some(color.into());
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn calibration(&self) -> ParseResult<Calibration> {
        Calibration::new(self.scale_factor, self.offset)
    }

    /// Name used in logs.
    pub fn label(&self) -> String {
        format!("{} ({})", self.remote_host, self.db_file)
    }

    /// Validate store configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = validate_database(prefix, &self.data_dir, &self.db_file, &self.db_table);
        errors.extend(validate_calibration(prefix, self.scale_factor, self.offset));

        if !is_http_url(&self.remote_host) {
            errors.push(ValidationError::new(
                format!("{}.remote_host", prefix),
                format!(
                    "'{}' must start with http:// or https://",
                    self.remote_host
                ),
            ));
        }

        if let Some(color) = &self.plot_color
            && color.is_empty()
        {
            errors.push(ValidationError::new(
                format!("{}.plot_color", prefix),
                "plot color cannot be empty string (omit it instead)",
            ));
        }

        if self.clip_fps == 0 {
            errors.push(ValidationError::new(
                format!("{}.clip_fps", prefix),
                "clip frame rate cannot be 0",
            ));
        }

        if let Some(dir) = &self.clip_dir
            && dir.as_os_str().is_empty()
        {
            errors.push(ValidationError::new(
                format!("{}.clip_dir", prefix),
                "clip directory cannot be empty (omit it instead)",
            ));
        }

        errors
    }
}

fn validate_database(
    prefix: &str,
    data_dir: &Path,
    db_file: &str,
    db_table: &str,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if data_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            format!("{}.data_dir", prefix),
            "data directory cannot be empty",
        ));
    }
    if db_file.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.db_file", prefix),
            "database file cannot be empty",
        ));
    } else if db_file.contains(['/', '\\']) {
        errors.push(ValidationError::new(
            format!("{}.db_file", prefix),
            format!("'{}' must be a file name, not a path", db_file),
        ));
    }
    if let Err(e) = scalecam_store::validate_table_name(db_table) {
        errors.push(ValidationError::new(
            format!("{}.db_table", prefix),
            e.to_string(),
        ));
    }

    errors
}

fn validate_calibration(prefix: &str, scale_factor: f64, offset: f64) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !scale_factor.is_finite() || scale_factor == 0.0 {
        errors.push(ValidationError::new(
            format!("{}.scale_factor", prefix),
            format!("scale factor must be a non-zero number, got {}", scale_factor),
        ));
    }
    if !offset.is_finite() {
        errors.push(ValidationError::new(
            format!("{}.offset", prefix),
            format!("offset must be a number, got {}", offset),
        ));
    }

    errors
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `stores[0].remote_host`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scalecam")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scalecam")
        .join("scalecam.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StoreConfig {
        StoreConfig::new(
            "/srv/scalecam",
            "weights.db",
            "measurements",
            "http://cats.local:8000",
            -10.97,
            -35_800.0,
        )
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.replication.period_secs, 15);
        assert_eq!(config.replication.clip_budget, Some(5));
        assert!(config.stores.is_empty());
        assert!(config.edge.trigger_url.is_none());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8001"

            [edge]
            data_dir = "/home/pi/data"
            db_file = "weights.db"
            scale_factor = -10.97
            offset = -35800.0
            trigger_url = "http://localhost:9000"

            [edge.source]
            kind = "simulated"
            baseline = -40000

            [edge.sampler]
            interval_ms = 200

            [edge.sampler.presence]
            low = 8.0
            high = 40.0

            [replication]
            period_secs = 30

            [[stores]]
            data_dir = "/srv/scalecam"
            db_file = "weights.db"
            remote_host = "http://cats.local:8000"
            scale_factor = -10.97
            offset = -35800.0
            clip_dir = "/srv/scalecam/clips"
            clip_fps = 3

            [[stores]]
            data_dir = "/srv/scalecam"
            db_file = "weights2.db"
            remote_host = "http://cam.local:8000"
            scale_factor = 10.97
            offset = -145700.0
            plot_color = "red"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8001");
        assert_eq!(config.edge.db_path(), PathBuf::from("/home/pi/data/weights.db"));
        assert_eq!(config.edge.db_table, "measurements");
        assert!(matches!(
            config.edge.source,
            SourceConfig::Simulated(ref s) if s.baseline == -40_000 && s.noise == 150
        ));
        assert_eq!(config.edge.sampler.interval_ms, 200);
        assert_eq!(config.edge.sampler.smoothing_window, 3);
        assert_eq!(config.edge.sampler.presence.high, 40.0);
        assert_eq!(config.replication.period_secs, 30);
        assert_eq!(config.stores.len(), 2);
        assert_eq!(config.stores[0].clip_fps, 3);
        assert!(config.stores[0].transcode);
        assert_eq!(config.stores[1].db_table, "measurements");
        assert_eq!(config.stores[1].plot_color.as_deref(), Some("red"));
        assert!(config.stores[1].clip_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_iio_source_toml() {
        let source: SourceConfig = toml::from_str("kind = \"iio\"\ndevice = 1\nchannel = 2").unwrap();
        assert_eq!(
            source,
            SourceConfig::Iio {
                device: 1,
                channel: 2
            }
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("scalecam.toml");

        let config = Config {
            stores: vec![store().with_clips("/srv/clips", 3)],
            ..Default::default()
        };
        config.save(&config_path).unwrap();

        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded.stores, config.stores);
        assert_eq!(loaded.replication, config.replication);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/scalecam.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_store_config_new_rejects_zero_scale() {
        let result = StoreConfig::new("/srv", "w.db", "measurements", "http://a:8000", 0.0, 0.0);
        let Err(ConfigError::Validation(errors)) = result else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "store.scale_factor");
    }

    #[test]
    fn test_store_config_new_rejects_nan() {
        let result = StoreConfig::new(
            "/srv",
            "w.db",
            "measurements",
            "http://a:8000",
            f64::NAN,
            f64::NAN,
        );
        let Err(ConfigError::Validation(errors)) = result else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["store.scale_factor", "store.offset"]);
    }

    #[test]
    fn test_store_config_validation() {
        let mut bad = store();
        bad.remote_host = "cats.local:8000".to_string();
        bad.db_table = "drop table".to_string();
        bad.db_file = "../weights.db".to_string();
        bad.clip_fps = 0;
        bad.plot_color = Some(String::new());

        let errors = bad.validate("stores[0]");
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"stores[0].remote_host"));
        assert!(fields.contains(&"stores[0].db_table"));
        assert!(fields.contains(&"stores[0].db_file"));
        assert!(fields.contains(&"stores[0].clip_fps"));
        assert!(fields.contains(&"stores[0].plot_color"));
    }

    #[test]
    fn test_duplicate_store_databases() {
        let config = Config {
            stores: vec![store(), store()],
            ..Default::default()
        };
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation error");
        };
        assert!(errors.iter().any(|e| e.message.contains("already replicated")));
    }

    #[test]
    fn test_edge_validation() {
        let mut config = Config::default();
        config.edge.trigger_url = Some("localhost:9000".to_string());
        config.edge.sampler.smoothing_window = 0;
        config.edge.sampler.presence.low = 100.0;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "edge.trigger_url",
                "edge.sampler.smoothing_window",
                "edge.sampler.presence"
            ]
        );
    }

    #[test]
    fn test_server_bind_validation() {
        let valid = ServerConfig {
            bind: "[::1]:8080".to_string(),
        };
        assert!(valid.validate().is_empty());

        let no_port = ServerConfig {
            bind: "127.0.0.1".to_string(),
        };
        assert!(no_port.validate()[0].message.contains("host:port"));

        let port_zero = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        };
        assert!(port_zero.validate()[0].message.contains("cannot be 0"));
    }

    #[test]
    fn test_replication_validation() {
        let config = ReplicationConfig {
            period_secs: 0,
            data_limit: Some(0),
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("scalecam/scalecam.toml"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let error = ConfigError::Validation(vec![ValidationError::new(
            "stores[0].remote_host",
            "must start with http://",
        )]);
        assert!(error.to_string().contains("stores[0].remote_host"));
    }
}
