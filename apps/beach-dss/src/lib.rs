pub mod config;
pub mod handlers;
pub mod store;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health_check, put_message, take_message, SharedStore};
use crate::store::MessageStore;

pub fn router(max_queue: usize) -> Router {
    router_with_store(Arc::new(MessageStore::new(max_queue)))
}

pub fn router_with_store(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/data/:id",
            get(take_message).post(put_message).put(put_message),
        )
        .with_state(store)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
