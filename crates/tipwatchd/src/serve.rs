//! Serve mode — collector task plus HTTP API in one process.
//!
//! The collector runs in the background and stops when the shutdown
//! signal fires; the HTTP server drains in-flight requests for at most
//! [`SHUTDOWN_DRAIN`] and exits.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tipwatch_client::NodeClient;
use tipwatch_core::MonitorConfig;
use tipwatch_metrics::{Collector, PrometheusSink, SnapshotStore};

/// How long in-flight HTTP requests may run after the shutdown signal.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Run the collector and the HTTP API until Ctrl-C or SIGTERM.
///
/// Uptime in snapshots counts from `started_at`.
pub async fn run_serve(config: MonitorConfig, started_at: Instant) -> anyhow::Result<()> {
    info!(
        node_url = %config.node_url,
        node_id = %config.node_id,
        "tipwatch starting"
    );

    // ── Initialize components ──────────────────────────────────

    let client = NodeClient::new(&config.node_url)?.with_timeout(config.request_timeout);
    let store = SnapshotStore::new(config.node_id.clone());
    let exporter = Arc::new(PrometheusSink::new());

    let collector = Collector::new(
        client,
        store.clone(),
        exporter.clone(),
        config.node_id.clone(),
        config.interval,
    )
    .with_request_timeout(config.request_timeout)
    .with_start_time(started_at);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start collector ────────────────────────────────────────

    let collector_handle = tokio::spawn(async move {
        collector.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = tipwatch_api::build_router(store, exporter);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    serve_with_drain(listener, router, shutdown_signal(), shutdown_tx, SHUTDOWN_DRAIN).await?;

    if let Err(e) = collector_handle.await {
        error!(error = %e, "collector task failed");
    }

    info!("tipwatch stopped");
    Ok(())
}

/// Serve `router` until `signal` resolves, then raise `shutdown_tx` and give
/// in-flight requests up to `drain` to finish.
///
/// Returns `false` when the drain was cut short.
async fn serve_with_drain<S>(
    listener: TcpListener,
    router: Router,
    signal: S,
    shutdown_tx: watch::Sender<bool>,
    drain: Duration,
) -> anyhow::Result<bool>
where
    S: Future<Output = ()> + Send + 'static,
{
    let mut stopping = shutdown_tx.subscribe();
    let signalled = async move {
        let _ = stopping.wait_for(|stop| *stop).await;
    };

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result?;
            Ok(true)
        }
        _ = signalled => match tokio::time::timeout(drain, &mut server).await {
            Ok(result) => {
                result?;
                Ok(true)
            }
            Err(_) => {
                warn!(
                    drain_secs = drain.as_secs_f64(),
                    "HTTP drain timed out, closing remaining connections"
                );
                Ok(false)
            }
        },
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
