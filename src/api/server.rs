//! API Server
//!
//! Runs the REST server for the wizard and handles graceful shutdown.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::workflow::WorkflowController;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::RestRouter;

/// REST API server
pub struct ApiServer {
    config: ApiConfig,
    controller: Arc<WorkflowController>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, controller: Arc<WorkflowController>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            controller,
            shutdown_tx,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }

    /// Run until shutdown is triggered or the server fails
    pub async fn run(&self) -> Result<()> {
        info!("Starting API server on {}", self.config.addr);

        let handle = self.spawn_rest_server();
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("REST server task failed: {:?}", e);
                Err(Error::Internal(format!("REST server task failed: {}", e)))
            }
        }
    }

    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let config = self.config.clone();
        let controller = self.controller.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(config, controller, shutdown_rx).await })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Handle that can trigger shutdown from another task
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

async fn run_rest_server(
    config: ApiConfig,
    controller: Arc<WorkflowController>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = RestRouter::new(controller)
        .with_retention(Duration::from_secs(config.session_retention_secs))
        .build()
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;
    info!("REST API listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}
