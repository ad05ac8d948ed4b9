use serde::Serialize;
use tracing::{debug, info, warn};

use scalecam_store::Store;
use scalecam_types::Timestamp;

use super::MeasurementSource;
use crate::error::Result;

/// Outcome of one data catchup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataCatchupReport {
    /// Newest local timestamp before the pass.
    pub cursor: Option<Timestamp>,
    /// Rows returned by the remote.
    pub received: usize,
    /// Rows written locally.
    pub inserted: usize,
}

/// Copy rows newer than the local cursor from `remote` into `local`.
///
/// Rows at or before the cursor are dropped before writing: the store has
/// no unique key, so a remote that ignores `from_ts` must not cause
/// duplicates. The batch is written in one transaction.
pub async fn catchup_data(
    remote: &dyn MeasurementSource,
    local: &mut Store,
    limit: Option<u32>,
) -> Result<DataCatchupReport> {
    let cursor = local.latest_timestamp()?;
    match cursor {
        Some(ts) => debug!("Updating {} from {}", local.table(), ts),
        None => debug!("Updating {} from the beginning", local.table()),
    }

    let mut rows = remote.fetch_rows(cursor, limit).await?;
    let received = rows.len();

    if let Some(cursor) = cursor {
        rows.retain(|row| row.ts > cursor);
        let stale = received - rows.len();
        if stale > 0 {
            warn!(
                "Dropped {} rows at or before cursor {} from remote",
                stale, cursor
            );
        }
    }

    if rows.is_empty() {
        debug!("Received no new rows");
        return Ok(DataCatchupReport {
            cursor,
            received,
            inserted: 0,
        });
    }

    let inserted = local.write_all(&rows)?;
    info!("Added {} rows to {}", inserted, local.table());

    Ok(DataCatchupReport {
        cursor,
        received,
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use scalecam_types::MeasurementRow;
    use std::sync::Mutex;

    /// Serves a fixed list of rows, optionally ignoring the cursor.
    struct FakeRemote {
        rows: Vec<MeasurementRow>,
        honour_cursor: bool,
        requests: Mutex<Vec<(Option<Timestamp>, Option<u32>)>>,
    }

    impl FakeRemote {
        fn new(ts: &[i64]) -> Self {
            Self {
                rows: ts.iter().map(|&t| row(t)).collect(),
                honour_cursor: true,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MeasurementSource for FakeRemote {
        async fn fetch_rows(
            &self,
            after: Option<Timestamp>,
            limit: Option<u32>,
        ) -> Result<Vec<MeasurementRow>> {
            self.requests.lock().unwrap().push((after, limit));
            let rows = self
                .rows
                .iter()
                .filter(|r| !self.honour_cursor || after.is_none_or(|a| r.ts > a))
                .take(limit.map_or(usize::MAX, |l| l as usize))
                .copied()
                .collect();
            Ok(rows)
        }
    }

    struct DownRemote;

    #[async_trait]
    impl MeasurementSource for DownRemote {
        async fn fetch_rows(&self, _: Option<Timestamp>, _: Option<u32>) -> Result<Vec<MeasurementRow>> {
            Err(Error::unavailable("http://cats.local:8000/", "connection refused"))
        }
    }

    fn row(ts: i64) -> MeasurementRow {
        MeasurementRow {
            ts: Timestamp::from_micros(ts),
            raw: -40_000 - ts,
            config_id: 1,
        }
    }

    fn local_ts(store: &Store) -> Vec<i64> {
        store
            .range(None, None, None)
            .unwrap()
            .iter()
            .map(|r| r.ts.as_micros())
            .collect()
    }

    #[tokio::test]
    async fn test_full_sync_from_empty() {
        let remote = FakeRemote::new(&[10, 20, 30]);
        let mut local = Store::open_in_memory("measurements").unwrap();

        let report = catchup_data(&remote, &mut local, None).await.unwrap();
        assert_eq!(report.cursor, None);
        assert_eq!(report.inserted, 3);
        assert_eq!(local_ts(&local), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_only_rows_after_cursor() {
        let remote = FakeRemote::new(&[10, 20, 30]);
        let mut local = Store::open_in_memory("measurements").unwrap();
        local.write_all(&[row(10), row(20)]).unwrap();

        let report = catchup_data(&remote, &mut local, None).await.unwrap();
        assert_eq!(report.cursor, Some(Timestamp::from_micros(20)));
        assert_eq!(report.inserted, 1);
        assert_eq!(local_ts(&local), vec![10, 20, 30]);
        assert_eq!(
            remote.requests.lock().unwrap()[0],
            (Some(Timestamp::from_micros(20)), None)
        );
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let remote = FakeRemote::new(&[10, 20, 30]);
        let mut local = Store::open_in_memory("measurements").unwrap();

        catchup_data(&remote, &mut local, None).await.unwrap();
        let report = catchup_data(&remote, &mut local, None).await.unwrap();
        assert_eq!(report.received, 0);
        assert_eq!(report.inserted, 0);
        assert_eq!(local.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stale_rows_from_remote_are_dropped() {
        let mut remote = FakeRemote::new(&[10, 20, 30]);
        remote.honour_cursor = false;
        let mut local = Store::open_in_memory("measurements").unwrap();
        local.write_all(&[row(10), row(20)]).unwrap();

        let report = catchup_data(&remote, &mut local, None).await.unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.inserted, 1);
        assert_eq!(local_ts(&local), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_limit_converges_over_passes() {
        let remote = FakeRemote::new(&[10, 20, 30, 40, 50]);
        let mut local = Store::open_in_memory("measurements").unwrap();

        let mut passes = 0;
        while catchup_data(&remote, &mut local, Some(2)).await.unwrap().inserted > 0 {
            passes += 1;
        }
        assert_eq!(passes, 3);
        assert_eq!(local_ts(&local), vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test]
    async fn test_remote_error_leaves_store_untouched() {
        let mut local = Store::open_in_memory("measurements").unwrap();
        local.write_all(&[row(10)]).unwrap();

        let err = catchup_data(&DownRemote, &mut local, None).await.unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable { .. }));
        assert_eq!(local_ts(&local), vec![10]);
    }

    #[tokio::test]
    async fn test_invalid_batch_is_rejected_whole() {
        let mut remote = FakeRemote::new(&[10, 20]);
        remote.rows[1].config_id = 0;
        let mut local = Store::open_in_memory("measurements").unwrap();

        let err = catchup_data(&remote, &mut local, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Store(scalecam_store::Error::BatchWrite { row: 1, .. })
        ));
        assert_eq!(local.count().unwrap(), 0);
    }
}
