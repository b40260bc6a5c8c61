//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::service::BridgeService;

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// If true, ignore SIGTERM and wait for explicit /shutdown or SIGINT.
    pub await_explicit_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            await_explicit_shutdown: false,
        }
    }
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(config: ServerConfig, service: Arc<BridgeService>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, config.await_explicit_shutdown, service).await
}

/// Serve on an already-bound listener.
///
/// After the HTTP side drains, in-flight dispatches are cancelled and awaited
/// so no worker or artifact outlives the server.
pub async fn serve_listener(
    listener: TcpListener,
    await_explicit_shutdown: bool,
    service: Arc<BridgeService>,
) -> anyhow::Result<()> {
    let shutdown_rx = service.shutdown_rx();
    let app = routes(service.clone());

    let actual_addr = listener.local_addr()?;
    info!("Starting mailbridge server on {}", actual_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(await_explicit_shutdown, shutdown_rx))
        .await?;

    info!("Server shutdown complete");

    service.shutdown().await;

    Ok(())
}

/// Resolves on the first stop request. A signal whose handler cannot be
/// installed is logged and then never fires.
async fn shutdown_signal(await_explicit_shutdown: bool, mut shutdown_rx: watch::Receiver<bool>) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        if await_explicit_shutdown {
            info!("SIGTERM ignored; stop with SIGINT or POST /shutdown");
            return std::future::pending::<()>().await;
        }
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = {
        let _ = await_explicit_shutdown;
        std::future::pending::<()>()
    };

    // A dropped sender means nobody can ask any more; stop listening.
    let requested = async {
        if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let source = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
        _ = requested => "POST /shutdown",
    };
    info!(source, "Stopping mailbridge server");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert!(!config.await_explicit_shutdown);
    }

    #[tokio::test]
    async fn shutdown_request_stops_waiting() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(shutdown_signal(true, rx));

        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("shutdown_signal should resolve")
            .unwrap();
    }
}
