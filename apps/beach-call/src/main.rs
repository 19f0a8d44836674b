use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use beach_signaling::config::{
    DEFAULT_POLL_INTERVAL_MS, ENV_ICE_SEPARATOR, ENV_LOCAL_PEER, ENV_POLL_INTERVAL_MS,
    ENV_RELAY_URL, ENV_REMOTE_PEER,
};
use beach_signaling::message::DEFAULT_ICE_SEPARATOR;
use beach_signaling::poll::ExponentialBackoff;
use beach_signaling::{HttpRelay, SignalingConfig, SignalingSession, local_event_channel};
use clap::Parser;
use signaling_webrtc::{WebRtcConfig, WebRtcNegotiator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beach-call")]
#[command(about = "Establish a WebRTC peer connection through a polled signaling relay")]
struct Cli {
    /// Relay base URL (e.g., http://localhost:3000)
    #[arg(long, env = ENV_RELAY_URL)]
    relay: String,

    /// Our peer id; a random one is generated when omitted
    #[arg(long, env = ENV_LOCAL_PEER)]
    local: Option<String>,

    /// Peer id to signal
    #[arg(long, env = ENV_REMOTE_PEER)]
    remote: String,

    /// Initiate the call by sending an offer
    #[arg(long)]
    offer: bool,

    #[arg(long, env = ENV_POLL_INTERVAL_MS, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_ms: u64,

    #[arg(long, env = ENV_ICE_SEPARATOR, default_value = DEFAULT_ICE_SEPARATOR)]
    ice_separator: String,

    /// Give up if the peer connection is not up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut builder = SignalingConfig::builder()
        .relay_url(cli.relay.clone())
        .remote_peer_id(cli.remote.clone())
        .poll_interval(Duration::from_millis(cli.poll_ms))
        .ice_separator(cli.ice_separator.clone());
    builder = match cli.local.clone() {
        Some(local) => builder.local_peer_id(local),
        None => builder.local_peer_from(|| uuid::Uuid::new_v4().to_string()),
    };
    let config = builder.build().context("invalid signaling configuration")?;
    println!("local peer id: {}", config.local_peer_id);

    let relay = Arc::new(
        HttpRelay::new(config.relay_url.clone(), config.request_timeout)
            .context("failed to build relay client")?,
    );
    let (events_tx, events_rx) = local_event_channel();
    let negotiator = Arc::new(
        WebRtcNegotiator::new(WebRtcConfig::from_env(), events_tx)
            .await
            .context("failed to create peer connection")?,
    );

    let poll_interval = config.poll_interval;
    let session = Arc::new(
        SignalingSession::builder(config, relay, negotiator.clone())
            .retry_policy(Arc::new(ExponentialBackoff {
                base: poll_interval,
                max: Duration::from_secs(10),
            }))
            .diagnostics(|diagnostic| warn!(?diagnostic, "signaling diagnostic"))
            .start(events_rx)?,
    );

    let runner = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run(poll_interval / 5).await })
    };

    if cli.offer {
        negotiator.create_offer().await.context("failed to create offer")?;
        info!(remote = %cli.remote, "offer sent");
    }

    let timeout = Duration::from_secs(cli.timeout_secs);
    let outcome = tokio::select! {
        result = negotiator.wait_connected(timeout) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    if outcome.is_ok() {
        session.mark_connected();
        info!(phase = ?session.phase(), "peer connection established");
    }
    session.close();
    let _ = runner.await;

    match outcome {
        Ok(()) => {
            println!("connected to {}", session.remote_peer());
            negotiator.close().await.context("failed to close peer connection")?;
            Ok(())
        }
        Err(err) => {
            let _ = negotiator.close().await;
            bail!("call failed: {err}")
        }
    }
}
