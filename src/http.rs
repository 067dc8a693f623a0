//! Diagnostic HTTP endpoint.
//!
//! Serves the export map as JSON on `/debug` and a liveness probe on
//! `/health`. Handlers only read the export map, so the server runs as an
//! ordinary tokio task beside the reactor's local tasks.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use slpd_core::{ExportMap, ExportValue};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Diagnostic HTTP server bound to a loopback port.
pub struct DiagnosticsServer {
    export_map: ExportMap,
    listener: Option<std::net::TcpListener>,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl DiagnosticsServer {
    /// Binds the endpoint; serving starts with [`DiagnosticsServer::start`].
    pub fn init(address: SocketAddr, export_map: ExportMap) -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        info!(address = %local_addr, "HTTP diagnostics bound");
        Ok(Self {
            export_map,
            listener: Some(listener),
            local_addr,
            shutdown: None,
        })
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts serving on the current tokio runtime.
    pub fn start(&mut self) -> std::io::Result<()> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);

        let app = router(self.export_map.clone());
        let address = self.local_addr;
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(address = %address, error = %e, "HTTP diagnostics failed");
            }
            info!(address = %address, "HTTP diagnostics stopped");
        });

        info!(address = %address, "HTTP diagnostics serving");
        Ok(())
    }

    /// Stops serving. Idempotent.
    pub fn stop(&mut self) {
        self.listener.take();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for DiagnosticsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn router(export_map: ExportMap) -> Router {
    Router::new()
        .route("/debug", get(debug_vars))
        .route("/health", get(health_check))
        .with_state(export_map)
}

async fn debug_vars(State(export_map): State<ExportMap>) -> Json<BTreeMap<String, ExportValue>> {
    Json(export_map.snapshot())
}

async fn health_check() -> &'static str {
    "ok"
}
