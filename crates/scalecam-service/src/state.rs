//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;

use scalecam_store::Store;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::Result;

/// Shared provider state.
pub struct AppState {
    /// The edge store. The sampler writes through its own connection; this
    /// one only reads.
    pub store: Mutex<Store>,
    /// Directory searched for clips.
    pub clip_dir: PathBuf,
}

impl AppState {
    pub fn new(store: Store, clip_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            clip_dir: clip_dir.into(),
        })
    }
}

/// Shared aggregator state for pushed rows.
pub struct IngestState {
    /// One connection per `[[stores]]` entry, in configuration order.
    pub stores: Vec<Mutex<Store>>,
}

impl IngestState {
    pub fn new(stores: Vec<Store>) -> Arc<Self> {
        Arc::new(Self {
            stores: stores.into_iter().map(Mutex::new).collect(),
        })
    }

    /// Open every configured store.
    pub fn open(config: &Config) -> Result<Arc<Self>> {
        let stores = config
            .stores
            .iter()
            .map(|store| Store::open(store.db_path(), &store.db_table))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(stores))
    }
}
