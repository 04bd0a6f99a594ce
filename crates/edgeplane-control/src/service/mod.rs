//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::sync::Arc;

use axum::http::StatusCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::{ControlConfig, StoreBackend};
use crate::error::{ControlError, ControlResult};
use crate::node::{HttpNodeConnector, NodeDispatcher};
use crate::store::{MemoryStore, PersistenceService, PostgresStore};
use crate::transport::Transport;

/// The control service.
///
/// Owns the store, the node dispatcher and the HTTP server, and shuts them
/// down together when a signal arrives or [`ControlService::shutdown`] is
/// called.
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service until shutdown.
    ///
    /// A configured PostgreSQL backend that cannot be reached is fatal.
    pub async fn run(&self) -> ControlResult<()> {
        let store = self.create_store().await?;

        let connector = HttpNodeConnector::new(self.config.nodes.clone());
        let dispatcher = NodeDispatcher::new(Arc::new(connector));
        info!(
            scheme = %self.config.nodes.scheme,
            rpc_timeout_secs = self.config.nodes.rpc_timeout_secs,
            "node dispatcher configured"
        );

        let state = api::AppState {
            store,
            dispatcher,
            cancel: self.cancel.clone(),
        };

        let app = api::router(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.server.request_timeout(),
            ))
            .layer(TraceLayer::new_for_http());

        info!(
            transport = %self.config.server.listen,
            "control service listening"
        );

        serve_transport(self.config.server.listen.clone(), app, self.cancel.clone()).await?;

        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_store(&self) -> ControlResult<Arc<dyn PersistenceService>> {
        match self.config.database.backend {
            StoreBackend::Memory => {
                info!("using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Postgres => {
                let store = PostgresStore::new(&self.config.database)
                    .await
                    .inspect_err(|e| error!(error = %e, "failed to connect to PostgreSQL"))?;
                info!(
                    max_connections = self.config.database.max_connections,
                    "connected to PostgreSQL"
                );
                Ok(Arc::new(store))
            }
        }
    }
}

/// Serve an axum router over the given transport with graceful shutdown.
async fn serve_transport(
    transport: Transport,
    app: axum::Router,
    cancel: CancellationToken,
) -> ControlResult<()> {
    match transport {
        Transport::Tcp { addr } => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| ControlError::Config(format!("failed to bind TCP: {e}")))?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(cancel))
                .await
                .map_err(|e| ControlError::internal(format!("server error: {e}")))?;
        }
        Transport::Unix { path } => {
            // Ensure parent directory exists and remove stale socket
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ControlError::Config(format!("failed to create socket dir: {e}"))
                })?;
            }
            if path.exists() {
                tokio::fs::remove_file(&path).await.map_err(|e| {
                    ControlError::Config(format!("failed to remove stale socket: {e}"))
                })?;
            }
            let listener = tokio::net::UnixListener::bind(&path)
                .map_err(|e| ControlError::Config(format!("failed to bind Unix socket: {e}")))?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(cancel))
                .await
                .map_err(|e| ControlError::internal(format!("server error: {e}")))?;
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM or cancellation, and cancels `cancel` so
/// in-flight requests stop before their next store write.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }

    cancel.cancel();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, ServerConfig};

    #[test]
    fn service_shutdown() {
        let service = ControlService::new(ControlConfig::default());
        assert!(!service.cancel.is_cancelled());
        service.shutdown();
        assert!(service.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn memory_backend_needs_no_database() {
        let service = ControlService::new(ControlConfig::default());
        let store = service.create_store().await.unwrap();
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_postgres_is_fatal() {
        let service = ControlService::new(ControlConfig {
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: "postgres://127.0.0.1:1/edgeplane".to_owned(),
                connect_timeout_secs: 1,
                ..DatabaseConfig::default()
            },
            ..ControlConfig::default()
        });
        assert!(service.create_store().await.is_err());
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let dir = std::env::temp_dir().join(format!("edgeplane-{}", uuid::Uuid::new_v4()));
        let service = Arc::new(ControlService::new(ControlConfig {
            server: ServerConfig {
                listen: Transport::unix(dir.join("control.sock")),
                ..ServerConfig::default()
            },
            ..ControlConfig::default()
        }));

        let runner = Arc::clone(&service);
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(dir.join("control.sock").exists());

        service.shutdown();
        handle.await.unwrap().unwrap();
        let _ = std::fs::remove_dir_all(dir);
    }
}
