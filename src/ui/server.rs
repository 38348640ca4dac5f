//! HTTP control server

use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::audio::AudioBridge;
use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::params::ParameterStore;
use crate::signaling::NegotiationHandle;
use crate::ui::handlers;

/// Shared state behind the HTTP handlers
pub struct AppState {
    pub store: Arc<ParameterStore>,
    pub bridge: Arc<AudioBridge>,
    pub negotiation: Option<NegotiationHandle>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<ParameterStore>,
        bridge: Arc<AudioBridge>,
        negotiation: Option<NegotiationHandle>,
    ) -> Self {
        Self {
            store,
            bridge,
            negotiation,
            started: Instant::now(),
        }
    }
}

pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/params", get(handlers::get_params))
            .route("/api/params/:stage/:field", put(handlers::set_param))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until the listener fails
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Control API listening on http://{}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("HTTP server failed: {}", e)))
    }

    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                error!("Control API stopped: {}", e);
            }
        })
    }
}
