//! scalecam - load-cell sampler, provider API and replication aggregator.
//!
//! Run with: `cargo run -p scalecam-service -- <command>`

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use scalecam_core::{
    AnalysisConfig, HttpTrigger, IioSource, NoopTrigger, RecordingTrigger, SampleSource, Sampler,
    SimulatedSource, analyze,
};
use scalecam_service::shutdown::shutdown_token;
use scalecam_service::{AppState, Config, IngestState, Scheduler, SourceConfig, api};
use scalecam_store::{MeasurementQuery, Store};
use scalecam_types::{Calibration, Timestamp};

/// scalecam - weigh, record and replicate.
#[derive(Parser, Debug)]
#[command(name = "scalecam")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the edge sampling loop.
    Sample {
        /// Read simulated values instead of the configured source.
        #[arg(long)]
        simulate: bool,

        /// Also serve the provider API.
        #[arg(long)]
        serve: bool,
    },

    /// Serve the edge store and clips to aggregators.
    Serve {
        /// Bind address (overrides config).
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Replicate every configured store.
    Replicate {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,

        /// Also accept pushed rows on this address.
        #[arg(short, long, conflicts_with = "once")]
        bind: Option<String>,
    },

    /// Print the derived weight series as JSON lines.
    Analyze {
        /// Index into `[[stores]]`; the edge store when omitted.
        #[arg(short, long)]
        store: Option<usize>,

        /// Only samples after this time (microseconds or RFC 3339).
        #[arg(long)]
        from: Option<Timestamp>,

        /// Only samples up to this time.
        #[arg(long)]
        to: Option<Timestamp>,

        #[arg(long, default_value_t = 100)]
        short_window: usize,

        #[arg(long, default_value_t = 5000)]
        long_window: usize,
    },

    /// Export measurements as CSV.
    Export {
        /// Index into `[[stores]]`; the edge store when omitted.
        #[arg(short, long)]
        store: Option<usize>,

        #[arg(long)]
        from: Option<Timestamp>,

        #[arg(long)]
        to: Option<Timestamp>,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scalecam_service=info".parse()?)
                .add_directive("scalecam_core=info".parse()?)
                .add_directive("scalecam_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load_validated(path)?,
        None => {
            let config = Config::load_default()?;
            config.validate()?;
            config
        }
    };

    match args.command {
        Command::Sample { simulate, serve } => run_sample(config, simulate, serve).await,
        Command::Serve { bind } => {
            let cancel = shutdown_token();
            let addr = bind.unwrap_or_else(|| config.server.bind.clone());
            serve(&config, &addr, cancel).await
        }
        Command::Replicate { once, bind } => run_replicate(config, once, bind).await,
        Command::Analyze {
            store,
            from,
            to,
            short_window,
            long_window,
        } => {
            let (store, calibration) = open_store(&config, store)?;
            let rows = store.query(&range_query(from, to))?;
            let points = analyze(
                &rows,
                &calibration,
                &AnalysisConfig {
                    short_window,
                    long_window,
                },
            )?;

            let mut out = std::io::BufWriter::new(std::io::stdout().lock());
            for point in &points {
                writeln!(out, "{}", serde_json::to_string(point)?)?;
            }
            out.flush()?;
            Ok(())
        }
        Command::Export {
            store,
            from,
            to,
            output,
        } => {
            let replicated = store.is_some();
            let (db, store_calibration) = open_store(&config, store)?;
            let query = range_query(from, to);
            // Edge rows carry their own calibration
            let calibration = replicated.then_some(&store_calibration);

            let count = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    db.export_csv(&query, calibration, std::io::BufWriter::new(file))?
                }
                None => db.export_csv(&query, calibration, std::io::stdout().lock())?,
            };
            info!("Exported {} rows", count);
            Ok(())
        }
    }
}

fn open_store(config: &Config, index: Option<usize>) -> anyhow::Result<(Store, Calibration)> {
    match index {
        None => {
            let edge = &config.edge;
            Ok((Store::open(edge.db_path(), &edge.db_table)?, edge.calibration()?))
        }
        Some(i) => {
            let Some(store) = config.stores.get(i) else {
                bail!("No store {} ({} configured)", i, config.stores.len());
            };
            Ok((Store::open(store.db_path(), &store.db_table)?, store.calibration()?))
        }
    }
}

fn range_query(from: Option<Timestamp>, to: Option<Timestamp>) -> MeasurementQuery {
    let mut query = MeasurementQuery::new();
    if let Some(from) = from {
        query = query.after(from);
    }
    if let Some(to) = to {
        query = query.until(to);
    }
    query
}

async fn serve(config: &Config, bind: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let edge = &config.edge;
    let store = Store::open(edge.db_path(), &edge.db_table)?;
    let state = AppState::new(store, edge.clip_dir.clone());
    let app = Router::new().merge(api::router()).with_state(state);
    listen(app, bind, cancel).await
}

async fn serve_ingest(config: &Config, bind: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let state = IngestState::open(config)?;
    let app = Router::new().merge(api::ingest_router()).with_state(state);
    listen(app, bind, cancel).await
}

async fn listen(app: Router, bind: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let app = app.layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr: SocketAddr = bind.parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

fn open_source(config: &SourceConfig) -> Box<dyn SampleSource> {
    match config {
        SourceConfig::Iio { device, channel } => Box::new(IioSource::hx711(*device, *channel)),
        SourceConfig::File { path } => Box::new(IioSource::new(path)),
        SourceConfig::Simulated(simulation) => Box::new(SimulatedSource::new(simulation.clone())),
    }
}

async fn run_sample(config: Config, simulate: bool, with_api: bool) -> anyhow::Result<()> {
    let cancel = shutdown_token();

    let server = with_api.then(|| {
        let config = config.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let bind = config.server.bind.clone();
            serve(&config, &bind, cancel).await
        })
    });

    let source = if simulate {
        open_source(&SourceConfig::Simulated(Default::default()))
    } else {
        open_source(&config.edge.source)
    };

    let result = match &config.edge.trigger_url {
        Some(url) => {
            let trigger = HttpTrigger::new(url)?;
            run_sampler(&config, source, trigger, cancel.clone()).await
        }
        None => {
            warn!("No trigger_url configured; recordings will not be started");
            run_sampler(&config, source, NoopTrigger, cancel.clone()).await
        }
    };

    // Stop the provider with the sampler
    cancel.cancel();
    if let Some(server) = server {
        server.await??;
    }
    result
}

async fn run_sampler<T: RecordingTrigger>(
    config: &Config,
    source: Box<dyn SampleSource>,
    trigger: T,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let edge = &config.edge;
    let store = Store::open(edge.db_path(), &edge.db_table)?;
    let store = Arc::new(tokio::sync::Mutex::new(store));

    let sampler = Sampler::new(
        source,
        store,
        edge.calibration()?,
        trigger,
        edge.sampler.clone(),
    )
    .await?;
    info!(
        "Sampling every {:?} with calibration {}",
        edge.sampler.interval(),
        sampler.config_id()
    );

    let stats = sampler.run(cancel).await?;
    info!("Sampler stopped: {}", serde_json::to_string(&stats)?);
    Ok(())
}

async fn run_replicate(config: Config, once: bool, bind: Option<String>) -> anyhow::Result<()> {
    if config.stores.is_empty() {
        bail!("No [[stores]] configured");
    }

    let mut scheduler = Scheduler::from_config(&config)?;

    if once {
        let reports = scheduler.run_once().await;
        let failed = reports.iter().filter(|r| r.failures > 0 || r.timed_out).count();
        for (store, report) in config.stores.iter().zip(&reports) {
            info!(
                "{}: {} rows, {} clips",
                store.label(),
                report.rows_inserted(),
                report.clips_fetched()
            );
        }
        if failed > 0 {
            bail!("{} of {} store(s) failed", failed, reports.len());
        }
        return Ok(());
    }

    let cancel = shutdown_token();
    let server = bind.map(|bind| {
        let config = config.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = serve_ingest(&config, &bind, cancel.clone()).await;
            // A failed listener stops replication too
            if result.is_err() {
                cancel.cancel();
            }
            result
        })
    });

    let stats = scheduler.run(cancel.clone()).await;
    cancel.cancel();
    if let Some(server) = server {
        server.await??;
    }
    for s in &stats {
        info!(
            "{}: {} ticks ({} failed, {} timed out), {} rows, {} clips, worst tick {:?}",
            s.store, s.ticks, s.failed_ticks, s.timeouts, s.rows_inserted, s.clips_fetched, s.worst_tick
        );
    }
    Ok(())
}
