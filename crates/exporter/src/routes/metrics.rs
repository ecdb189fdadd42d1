use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};

use crate::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn metrics_router() -> Router<AppState> {
    Router::new()
        .route("/", get(metrics))
        .route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.metrics.render().await)
}
