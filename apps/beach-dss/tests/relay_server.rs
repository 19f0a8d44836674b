use std::net::SocketAddr;
use std::time::Duration;

use beach_signaling::{HttpRelay, Relay, RelayError, SignalingMessage, message};
use reqwest::StatusCode;
use tokio::net::TcpListener;
use url::Url;

async fn spawn_relay(max_queue: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = beach_dss::router(max_queue);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn relay_client(addr: SocketAddr) -> HttpRelay {
    HttpRelay::new(
        Url::parse(&format!("http://{addr}/")).expect("url"),
        Duration::from_secs(2),
    )
    .expect("client")
}

fn offer(sdp: &str) -> bytes::Bytes {
    message::encode(&SignalingMessage::offer(sdp)).expect("encode")
}

#[tokio::test]
async fn messages_flow_between_peers() {
    let addr = spawn_relay(8).await;
    let relay = relay_client(addr);

    assert_eq!(relay.fetch("bob").await, Ok(None));
    relay.publish("bob", offer("v=0 one")).await.expect("publish");
    relay.publish("bob", offer("v=0 two")).await.expect("publish");
    assert_eq!(relay.fetch("alice").await, Ok(None));

    let first = relay.fetch("bob").await.expect("fetch").expect("first");
    assert_eq!(message::decode(&first).expect("decode"), SignalingMessage::offer("v=0 one"));
    let second = relay.fetch("bob").await.expect("fetch").expect("second");
    assert_eq!(message::decode(&second).expect("decode"), SignalingMessage::offer("v=0 two"));
    assert_eq!(relay.fetch("bob").await, Ok(None));
}

#[tokio::test]
async fn non_signaling_bodies_are_rejected() {
    let addr = spawn_relay(8).await;
    let relay = relay_client(addr);

    let err = relay
        .publish("bob", bytes::Bytes::from_static(b"hello"))
        .await
        .expect_err("plain text must be rejected");
    assert_eq!(err.status(), Some(400));
    assert!(matches!(err, RelayError::Status { .. }));
    assert_eq!(relay.fetch("bob").await, Ok(None));
}

#[tokio::test]
async fn put_is_accepted_like_post() {
    let addr = spawn_relay(8).await;
    let client = reqwest::Client::new();
    let response = client
        .put(format!("http://{addr}/data/carol"))
        .body(offer("v=0 put").to_vec())
        .send()
        .await
        .expect("put");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("http://{addr}/data/carol"))
        .send()
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
}

#[tokio::test]
async fn full_queue_drops_oldest() {
    let addr = spawn_relay(2).await;
    let relay = relay_client(addr);
    for sdp in ["v=0 a", "v=0 b", "v=0 c"] {
        relay.publish("bob", offer(sdp)).await.expect("publish");
    }
    let next = relay.fetch("bob").await.expect("fetch").expect("message");
    assert_eq!(message::decode(&next).expect("decode").payload, "v=0 b");
}

#[tokio::test]
async fn health_reports_ok() {
    let addr = spawn_relay(8).await;
    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health")
        .json()
        .await
        .expect("json");
    assert_eq!(body["status"], "ok");
}
