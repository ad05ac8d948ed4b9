//! Periodic replication of every configured store.
//!
//! Each store gets its own task that owns its database connection and
//! remote client, so stores never wait on each other and each local table
//! has exactly one writer. A tick runs data catchup and then file catchup,
//! bounded by the tick timeout. Failures are logged and retried on the next
//! tick.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scalecam_store::Store;

use crate::catchup::{
    ClipSource, DataCatchupReport, FileCatchupReport, MeasurementSource, catchup_data,
    catchup_files,
};
use crate::config::{Config, ReplicationConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::remote::RemoteStore;
use crate::transcode::{FfmpegTranscoder, NoopTranscoder, Transcoder};

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub data: Option<DataCatchupReport>,
    pub files: Option<FileCatchupReport>,
    /// Catchup passes that failed.
    pub failures: u32,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl TickReport {
    pub fn rows_inserted(&self) -> usize {
        self.data.map_or(0, |d| d.inserted)
    }

    pub fn clips_fetched(&self) -> usize {
        self.files.as_ref().map_or(0, |f| f.fetched.len())
    }
}

/// Running totals for one store.
#[derive(Debug, Clone, Default)]
pub struct ReplicationStats {
    pub store: String,
    pub ticks: u64,
    pub failed_ticks: u64,
    pub timeouts: u64,
    pub rows_inserted: u64,
    pub clips_fetched: u64,
    pub worst_tick: Duration,
}

impl ReplicationStats {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if report.failures > 0 || report.timed_out {
            self.failed_ticks += 1;
        }
        if report.timed_out {
            self.timeouts += 1;
        }
        self.rows_inserted += report.rows_inserted() as u64;
        self.clips_fetched += report.clips_fetched() as u64;
        if report.elapsed > self.worst_tick {
            self.worst_tick = report.elapsed;
        }
    }
}

/// Replicates one remote store into its local database and clip directory.
pub struct Replicator<R = RemoteStore> {
    config: StoreConfig,
    store: Store,
    remote: R,
    transcoder: Box<dyn Transcoder>,
    data_limit: Option<u32>,
    clip_budget: Option<u32>,
}

impl Replicator<RemoteStore> {
    /// Open the local database and create the HTTP client for `config`.
    pub fn open(config: StoreConfig, replication: &ReplicationConfig) -> Result<Self> {
        let store = Store::open(config.db_path(), &config.db_table)?;
        let remote = RemoteStore::new(&config.remote_host, replication.request_timeout())?;
        let transcoder: Box<dyn Transcoder> = if config.transcode {
            Box::new(FfmpegTranscoder::new(config.clip_fps))
        } else {
            Box::new(NoopTranscoder)
        };
        Ok(Self::new(config, store, remote, replication).with_transcoder(transcoder))
    }
}

impl<R: MeasurementSource + ClipSource> Replicator<R> {
    pub fn new(config: StoreConfig, store: Store, remote: R, replication: &ReplicationConfig) -> Self {
        Self {
            config,
            store,
            remote,
            transcoder: Box::new(NoopTranscoder),
            data_limit: replication.data_limit,
            clip_budget: replication.clip_budget,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Box<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run data catchup, then file catchup if a clip directory is set.
    ///
    /// A failed data pass does not skip the file pass.
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let label = self.config.label();
        let mut report = TickReport::default();

        match catchup_data(&self.remote, &mut self.store, self.data_limit).await {
            Ok(data) => report.data = Some(data),
            Err(e) => {
                report.failures += 1;
                log_failure(&label, &e);
            }
        }

        if let Some(dir) = &self.config.clip_dir {
            match catchup_files(&self.remote, dir, self.clip_budget, self.transcoder.as_ref()).await
            {
                Ok(files) => report.files = Some(files),
                Err(e) => {
                    report.failures += 1;
                    log_failure(&label, &e);
                }
            }
        }

        report.elapsed = started.elapsed();
        debug!(
            "Tick for {}: {} rows, {} clips in {:?}",
            label,
            report.rows_inserted(),
            report.clips_fetched(),
            report.elapsed
        );
        report
    }

    /// [`tick`](Self::tick), abandoned after `limit`.
    pub async fn tick_within(&mut self, limit: Duration) -> TickReport {
        let started = Instant::now();
        match tokio::time::timeout(limit, self.tick()).await {
            Ok(report) => report,
            Err(_) => {
                let e = Error::TickTimeout {
                    store: self.config.label(),
                    secs: limit.as_secs(),
                };
                log_failure(&self.config.label(), &e);
                TickReport {
                    timed_out: true,
                    elapsed: started.elapsed(),
                    ..Default::default()
                }
            }
        }
    }
}

fn log_failure(label: &str, e: &Error) {
    if e.is_transient() {
        warn!("Replication of {} failed: {}", label, e);
    } else {
        error!("Replication of {} failed: {}", label, e);
    }
}

/// Drives a set of replicators on a fixed period.
pub struct Scheduler<R = RemoteStore> {
    replicators: Vec<Replicator<R>>,
    period: Duration,
    tick_timeout: Duration,
}

impl Scheduler<RemoteStore> {
    /// Open every store in `config.stores`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let replicators = config
            .stores
            .iter()
            .cloned()
            .map(|store| Replicator::open(store, &config.replication))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(replicators, &config.replication))
    }
}

impl<R> Scheduler<R>
where
    R: MeasurementSource + ClipSource + 'static,
{
    pub fn new(replicators: Vec<Replicator<R>>, replication: &ReplicationConfig) -> Self {
        Self {
            replicators,
            period: replication.period(),
            tick_timeout: replication.tick_timeout(),
        }
    }

    pub fn len(&self) -> usize {
        self.replicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicators.is_empty()
    }

    /// Tick every store once, concurrently.
    pub async fn run_once(&mut self) -> Vec<TickReport> {
        let tick_timeout = self.tick_timeout;
        futures::future::join_all(
            self.replicators
                .iter_mut()
                .map(|r| r.tick_within(tick_timeout)),
        )
        .await
    }

    /// Tick every store each period until `cancel` fires.
    ///
    /// A tick in progress is allowed to finish (it is bounded by the tick
    /// timeout). Returns the stats of every store.
    pub async fn run(self, cancel: CancellationToken) -> Vec<ReplicationStats> {
        info!(
            "Replicating {} store(s) every {:?}",
            self.replicators.len(),
            self.period
        );

        let mut tasks = JoinSet::new();
        for replicator in self.replicators {
            tasks.spawn(replicate(
                replicator,
                self.period,
                self.tick_timeout,
                cancel.clone(),
            ));
        }

        let mut all = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(stats) => all.push(stats),
                Err(e) => error!("Replication task failed: {}", e),
            }
        }
        all
    }
}

async fn replicate<R: MeasurementSource + ClipSource>(
    mut replicator: Replicator<R>,
    period: Duration,
    tick_timeout: Duration,
    cancel: CancellationToken,
) -> ReplicationStats {
    let mut stats = ReplicationStats {
        store: replicator.config.label(),
        ..Default::default()
    };
    info!("Starting replication of {}", stats.store);

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        let report = replicator.tick_within(tick_timeout).await;
        stats.record(&report);
    }

    info!(
        "Stopped replication of {}: {} ticks, {} rows, {} clips",
        stats.store, stats.ticks, stats.rows_inserted, stats.clips_fetched
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catchup::ClipDownload;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use scalecam_types::{ClipName, MeasurementRow, Timestamp};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeRemote {
        rows: Vec<MeasurementRow>,
        clips: Vec<&'static str>,
        data_down: bool,
        hang: bool,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl MeasurementSource for FakeRemote {
        async fn fetch_rows(
            &self,
            after: Option<Timestamp>,
            _limit: Option<u32>,
        ) -> Result<Vec<MeasurementRow>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.data_down {
                return Err(Error::unavailable("http://fake/", "connection refused"));
            }
            Ok(self
                .rows
                .iter()
                .filter(|r| after.is_none_or(|a| r.ts > a))
                .copied()
                .collect())
        }
    }

    #[async_trait]
    impl ClipSource for FakeRemote {
        async fn next_clip(&self, after: Option<&ClipName>) -> Result<Option<ClipDownload>> {
            let next = self
                .clips
                .iter()
                .map(|n| ClipName::parse(n).unwrap())
                .filter(|n| after.is_none_or(|a| n > a))
                .min();
            Ok(next.map(|name| ClipDownload {
                name,
                body: futures::stream::iter([Ok(Bytes::from_static(b"clip"))]).boxed(),
            }))
        }
    }

    fn store_config(clip_dir: Option<&std::path::Path>) -> StoreConfig {
        let config = StoreConfig::new("/tmp", "cats.db", "measurements", "http://fake", 1.0, 0.0)
            .unwrap()
            .with_transcode(false);
        match clip_dir {
            Some(dir) => config.with_clips(dir, 3),
            None => config,
        }
    }

    fn rows(ts: &[i64]) -> Vec<MeasurementRow> {
        ts.iter()
            .map(|&t| MeasurementRow {
                ts: Timestamp::from_micros(t),
                raw: 100,
                config_id: 1,
            })
            .collect()
    }

    fn replicator(remote: FakeRemote, clip_dir: Option<&std::path::Path>) -> Replicator<FakeRemote> {
        Replicator::new(
            store_config(clip_dir),
            Store::open_in_memory("measurements").unwrap(),
            remote,
            &ReplicationConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_tick_replicates_data_and_clips() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote {
            rows: rows(&[10, 20]),
            clips: vec!["2024-01-01T000000.h264", "2024-01-02T000000.h264"],
            ..Default::default()
        };
        let mut replicator = replicator(remote, Some(dir.path()));

        let report = replicator.tick().await;
        assert_eq!(report.failures, 0);
        assert_eq!(report.rows_inserted(), 2);
        assert_eq!(report.clips_fetched(), 2);
        assert_eq!(replicator.store().count().unwrap(), 2);
        assert!(dir.path().join("2024-01-02T000000.h264").exists());

        let report = replicator.tick().await;
        assert_eq!(report.rows_inserted(), 0);
        assert_eq!(report.clips_fetched(), 0);
    }

    #[tokio::test]
    async fn test_data_failure_still_fetches_clips() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote {
            clips: vec!["2024-01-01T000000.h264"],
            data_down: true,
            ..Default::default()
        };
        let mut replicator = replicator(remote, Some(dir.path()));

        let report = replicator.tick().await;
        assert_eq!(report.failures, 1);
        assert!(report.data.is_none());
        assert_eq!(report.clips_fetched(), 1);
    }

    #[tokio::test]
    async fn test_no_clip_dir_skips_files() {
        let remote = FakeRemote {
            rows: rows(&[10]),
            clips: vec!["2024-01-01T000000.h264"],
            ..Default::default()
        };
        let mut replicator = replicator(remote, None);

        let report = replicator.tick().await;
        assert!(report.files.is_none());
        assert_eq!(report.rows_inserted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_remote_times_out() {
        let remote = FakeRemote {
            hang: true,
            ..Default::default()
        };
        let mut replicator = replicator(remote, None);

        let report = replicator.tick_within(Duration::from_secs(5)).await;
        assert!(report.timed_out);
        assert!(report.elapsed >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_once_ticks_every_store() {
        let a = replicator(
            FakeRemote {
                rows: rows(&[1, 2, 3]),
                ..Default::default()
            },
            None,
        );
        let b = replicator(
            FakeRemote {
                data_down: true,
                ..Default::default()
            },
            None,
        );
        let mut scheduler = Scheduler::new(vec![a, b], &ReplicationConfig::default());

        let reports = scheduler.run_once().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].rows_inserted(), 3);
        assert_eq!(reports[1].failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_cancelled() {
        let replication = ReplicationConfig {
            period_secs: 10,
            ..Default::default()
        };
        let replicator = Replicator::new(
            store_config(None),
            Store::open_in_memory("measurements").unwrap(),
            FakeRemote {
                rows: rows(&[1, 2]),
                ..Default::default()
            },
            &replication,
        );
        let scheduler = Scheduler::new(vec![replicator], &replication);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            // Ticks at 0s, 10s and 20s
            tokio::time::sleep(Duration::from_secs(25)).await;
            canceller.cancel();
        });

        let stats = scheduler.run(cancel).await;
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].ticks, 3);
        assert_eq!(stats[0].rows_inserted, 2);
        assert_eq!(stats[0].failed_ticks, 0);
    }
}
