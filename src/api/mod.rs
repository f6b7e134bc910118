pub mod ask;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ask", post(ask::ask))
        .route("/api/health", get(ask::health))
        .route("/api/config", get(ask::get_config))
        .with_state(state)
}
