pub mod config;
pub mod handlers;
pub mod relay;
pub mod session;
pub mod supervisor;
pub mod transcriber;

use crate::handlers::AppState;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::websocket_endpoint))
        .route("/health", get(handlers::health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}
