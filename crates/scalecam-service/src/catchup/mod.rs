//! Cursor-based catchup from a remote store.
//!
//! Neither pass keeps its own bookkeeping. The data cursor is the newest
//! timestamp in the local table and the file cursor is the newest clip name
//! in the local directory, both recomputed on every pass, so an interrupted
//! pass resumes where the durable state left off.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use scalecam_types::{ClipName, MeasurementRow, Timestamp};

use crate::error::Result;

mod data;
mod files;

pub use data::{DataCatchupReport, catchup_data};
pub use files::{FileCatchupReport, StopReason, catchup_files, local_cursor};
pub(crate) use files::walk_clips;

/// A remote that serves measurement rows.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Rows with `ts > after`, ascending, at most `limit`.
    async fn fetch_rows(
        &self,
        after: Option<Timestamp>,
        limit: Option<u32>,
    ) -> Result<Vec<MeasurementRow>>;
}

/// A remote that serves clip files one at a time.
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// The first clip whose name sorts after `after`, or `None` when there
    /// is nothing newer.
    async fn next_clip(&self, after: Option<&ClipName>) -> Result<Option<ClipDownload>>;
}

/// A clip being received.
pub struct ClipDownload {
    pub name: ClipName,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for ClipDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipDownload")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
