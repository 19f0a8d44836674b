use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use beach_signaling::message;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::store::MessageStore;

pub type SharedStore = Arc<MessageStore>;

pub async fn health_check(State(store): State<SharedStore>) -> Json<Value> {
    Json(json!({ "status": "ok", "peers": store.peers() }))
}

pub async fn put_message(
    State(store): State<SharedStore>,
    Path(peer_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    if let Err(err) = message::decode(&body) {
        debug!(peer = %peer_id, error = %err, "rejecting non-signaling body");
        return StatusCode::BAD_REQUEST;
    }
    if store.push(&peer_id, body) {
        warn!(peer = %peer_id, "queue full; dropped oldest message");
    }
    debug!(peer = %peer_id, pending = store.pending(&peer_id), "message queued");
    StatusCode::OK
}

pub async fn take_message(
    State(store): State<SharedStore>,
    Path(peer_id): Path<String>,
) -> Result<([(&'static str, &'static str); 1], Bytes), StatusCode> {
    match store.pop(&peer_id) {
        Some(body) => {
            debug!(peer = %peer_id, "message delivered");
            Ok(([("content-type", "application/json")], body))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}
