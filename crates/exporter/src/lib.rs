pub mod registry;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tracing::info;

use common::{Result, TradingMode};

pub use registry::MetricsRegistry;

/// Shared state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    pub trading_mode: TradingMode,
}

/// All exporter routes with `state` applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::metrics_router())
        .merge(routes::health_router())
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the process exits.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    info!(%addr, "Metrics exporter listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
