//! HTTP server lifecycle
//!
//! Binds the listener, serves the router with peer addresses attached and
//! tears the shells and managed processes down on shutdown.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use super::routes::{create_app, AppState};

/// The gateway server
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a server around prepared state
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Shared state (for autostart and tests)
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.state.shutdown_tx.subscribe()
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }

    /// Bind to the configured address and serve until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.state.settings.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Server listening on http://{}", local_addr);

        let app = create_app(self.state.clone());
        let mut shutdown_rx = self.shutdown_signal();

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, stopping server");
        })
        .await?;

        let session_count = self.state.shells.session_count().await;
        if session_count > 0 {
            info!("Closing {} active sessions...", session_count);
        }
        self.state.shells.shutdown_all().await;
        self.state.processes.shutdown_all().await;

        Ok(())
    }
}
