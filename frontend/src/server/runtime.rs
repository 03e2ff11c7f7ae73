use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::routes::create_router;
use crate::config::AppConfig;
use crate::observability::Telemetry;

/// Start the Axum HTTP server and run until a shutdown signal arrives
///
/// Storefront routes are served through the telemetry pipeline; `/health`,
/// `/health/ready` and the scrape endpoint are served directly. Pending spans
/// are flushed once the server has drained, or once `shutdown_timeout`
/// seconds have passed since the signal.
pub async fn start_server(config: AppConfig, telemetry: Telemetry) -> Result<()> {
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Starting frontend server"
    );

    let app = create_router(&telemetry, &config);

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {}. Is another process using this port?",
            bind_addr,
            e
        )
    })?;
    info!(address = %bind_addr, "Server successfully bound");

    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();
    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        notify.notify_one();
    })
    .into_future();

    let served = drain_within(
        serve,
        signalled,
        Duration::from_secs(config.server.shutdown_timeout),
    )
    .await;

    telemetry.shutdown();
    served?;

    info!("Server shutdown complete");
    Ok(())
}

/// Drive `serve` to completion, giving up `drain` after `signalled` fires.
async fn drain_within<F, E>(serve: F, signalled: Arc<Notify>, drain: Duration) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
{
    tokio::pin!(serve);
    tokio::select! {
        result = &mut serve => result,
        _ = async {
            signalled.notified().await;
            tokio::time::sleep(drain).await;
        } => {
            warn!(
                timeout_secs = drain.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
            Ok(())
        }
    }
}

/// Wait for SIGINT or SIGTERM
///
/// A signal handler that cannot be installed is logged and never fires; the
/// other one still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_bounded_after_signal() {
        let signalled = Arc::new(Notify::new());
        signalled.notify_one();

        let stuck = std::future::pending::<io::Result<()>>();
        let start = tokio::time::Instant::now();
        let result = drain_within(stuck, signalled, Duration::from_secs(5)).await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_deadline_before_signal() {
        let signalled = Arc::new(Notify::new());
        let serve = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err::<(), _>(io::Error::other("listener closed"))
        };

        let result = drain_within(serve, signalled, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
