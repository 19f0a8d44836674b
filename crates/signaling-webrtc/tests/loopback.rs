use std::sync::Arc;
use std::time::Duration;

use beach_signaling::{MemoryRelay, SignalingConfig, SignalingSession, local_event_channel};
use signaling_webrtc::{WebRtcConfig, WebRtcNegotiator};
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder};

fn init_tracing() {
    let _ = SubscriberBuilder::default()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn session_config(local: &str, remote: &str) -> SignalingConfig {
    SignalingConfig::builder()
        .relay_url("http://loopback.invalid")
        .local_peer_id(local)
        .remote_peer_id(remote)
        .poll_interval(Duration::from_millis(20))
        .build()
        .expect("config")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peers_connect_through_memory_relay() {
    init_tracing();
    let relay = Arc::new(MemoryRelay::new());
    let rtc = WebRtcConfig {
        ice_servers: Vec::new(),
        ..WebRtcConfig::default()
    };

    let (offer_tx, offer_rx) = local_event_channel();
    let offerer = Arc::new(
        WebRtcNegotiator::new(rtc.clone(), offer_tx)
            .await
            .expect("offerer"),
    );
    let offer_session = Arc::new(
        SignalingSession::start(
            session_config("offerer", "answerer"),
            relay.clone(),
            offerer.clone(),
            offer_rx,
        )
        .expect("offer session"),
    );

    let (answer_tx, answer_rx) = local_event_channel();
    let answerer = Arc::new(
        WebRtcNegotiator::new(rtc, answer_tx)
            .await
            .expect("answerer"),
    );
    let answer_session = Arc::new(
        SignalingSession::start(
            session_config("answerer", "offerer"),
            relay.clone(),
            answerer.clone(),
            answer_rx,
        )
        .expect("answer session"),
    );

    let runners = [Arc::clone(&offer_session), Arc::clone(&answer_session)].map(|session| {
        tokio::spawn(async move { session.run(Duration::from_millis(10)).await })
    });

    offerer.create_offer().await.expect("create offer");

    let timeout = Duration::from_secs(20);
    offerer.wait_connected(timeout).await.expect("offerer connected");
    answerer.wait_connected(timeout).await.expect("answerer connected");

    offer_session.close();
    answer_session.close();
    for runner in runners {
        runner.await.expect("run loop");
    }
    offerer.close().await.expect("close offerer");
    answerer.close().await.expect("close answerer");
}
