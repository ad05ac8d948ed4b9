//! Process shutdown signals.
//!
//! Both ctrl-c (SIGINT) and SIGTERM cancel the shared token, so the
//! sampler releases its source and stops a running recording whether the
//! process is stopped from a terminal or by systemd / docker.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A token cancelled on ctrl-c or SIGTERM.
///
/// Must be called from within the runtime. The SIGTERM handler is
/// installed before this returns.
pub fn shutdown_token() -> CancellationToken {
    cancel_on(shutdown_signal())
}

/// A token cancelled once `signal` completes.
pub fn cancel_on<F>(signal: F) -> CancellationToken
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        signal.await;
        token.cancel();
    });
    cancel
}

/// Completes on ctrl-c or SIGTERM.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    let terminate = terminate_signal();
    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("Received ctrl-c, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
    }
}

#[cfg(unix)]
fn terminate_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate());
    async move {
        match sigterm {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
fn terminate_signal() -> impl Future<Output = ()> + Send + 'static {
    std::future::pending()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use scalecam_core::{MockSource, MockTrigger, Sampler, SamplerConfig, Transition};
    use scalecam_store::Store;
    use scalecam_types::Calibration;

    #[tokio::test]
    async fn test_cancel_on_signal() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let cancel = cancel_on(async move {
            let _ = rx.await;
        });
        assert!(!cancel.is_cancelled());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), cancel.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_releases_sampler_source() {
        // 30 lb at 454 g/lb, enough samples to outlast the test
        let source = MockSource::new(vec![13_620; 10_000]);
        let released = source.released_flag();
        let trigger = MockTrigger::new();
        let store = Arc::new(tokio::sync::Mutex::new(
            Store::open_in_memory("measurements").unwrap(),
        ));
        let sampler = Sampler::new(
            Box::new(source),
            store,
            Calibration::new(1.0, 0.0).unwrap(),
            trigger.clone(),
            SamplerConfig {
                interval_ms: 1,
                smoothing_window: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let cancel = cancel_on(async move {
            let _ = rx.await;
        });
        let run = tokio::spawn(sampler.run(cancel));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(stats.samples > 0);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(trigger.calls(), vec![Transition::Start, Transition::Stop]);
    }
}
