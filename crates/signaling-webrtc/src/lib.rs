//! [`Negotiator`] backed by a `webrtc` peer connection.
//!
//! Local candidates and SDP are emitted as [`LocalEvent`]s for a
//! [`beach_signaling::SignalingSession`] to publish; remote messages routed by
//! the session land back here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beach_signaling::negotiation::LocalEventSender;
use beach_signaling::{IceCandidateFields, LocalEvent, NegotiationError, Negotiator, SdpKind};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub const ENV_DISABLE_STUN: &str = "BEACH_WEBRTC_DISABLE_STUN";
const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";
/// Used when the stack reports a candidate without a media id.
const FALLBACK_SDP_MID: &str = "0";

#[derive(Debug, Error)]
pub enum WebRtcError {
    #[error("webrtc error: {0}")]
    Rtc(#[from] webrtc::Error),
    #[error("peer connection did not connect within {0:?}")]
    Timeout(Duration),
    #[error("peer connection ended in state {0}")]
    Failed(RTCPeerConnectionState),
    #[error("signaling event channel closed")]
    EventsClosed,
    #[error("peer connection has no local description")]
    MissingLocalDescription,
}

#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<RTCIceServer>,
    pub data_channel_label: String,
    pub ordered: bool,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![RTCIceServer {
                urls: vec![DEFAULT_STUN.to_string()],
                ..Default::default()
            }],
            data_channel_label: "beach-signaling".to_string(),
            ordered: true,
        }
    }
}

impl WebRtcConfig {
    /// Defaults, minus the public STUN server when `BEACH_WEBRTC_DISABLE_STUN`
    /// is set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if std::env::var_os(ENV_DISABLE_STUN).is_some() {
            config.ice_servers.clear();
        }
        config
    }
}

#[derive(Default)]
struct CandidateBuffer {
    remote_description_set: bool,
    pending: Vec<RTCIceCandidateInit>,
}

pub struct WebRtcNegotiator {
    peer_connection: Arc<RTCPeerConnection>,
    events: LocalEventSender,
    config: WebRtcConfig,
    state: watch::Receiver<RTCPeerConnectionState>,
    data_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    candidates: Mutex<CandidateBuffer>,
}

impl WebRtcNegotiator {
    pub async fn new(config: WebRtcConfig, events: LocalEventSender) -> Result<Self, WebRtcError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers: config.ice_servers.clone(),
                ..Default::default()
            })
            .await?,
        );

        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    tracing::debug!(target = "signaling_webrtc", "ice gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let fields = IceCandidateFields::new(
                            init.candidate,
                            init.sdp_mline_index.unwrap_or(0),
                            init.sdp_mid
                                .filter(|mid| !mid.is_empty())
                                .unwrap_or_else(|| FALLBACK_SDP_MID.to_string()),
                        );
                        tracing::trace!(
                            target = "signaling_webrtc",
                            candidate = %fields.candidate,
                            "local ice candidate"
                        );
                        let _ = events.send(LocalEvent::IceCandidate(fields));
                    }
                    Err(err) => {
                        tracing::warn!(
                            target = "signaling_webrtc",
                            error = %err,
                            "failed to serialize local ice candidate"
                        );
                    }
                }
            })
        }));

        let (state_tx, state) = watch::channel(RTCPeerConnectionState::New);
        peer_connection.on_peer_connection_state_change(Box::new(
            move |next: RTCPeerConnectionState| {
                tracing::debug!(target = "signaling_webrtc", state = %next, "peer connection state");
                state_tx.send_replace(next);
                Box::pin(async {})
            },
        ));

        let data_channel = Arc::new(Mutex::new(None));
        let incoming = Arc::clone(&data_channel);
        peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let slot = Arc::clone(&incoming);
            Box::pin(async move {
                tracing::debug!(
                    target = "signaling_webrtc",
                    label = channel.label(),
                    "remote data channel opened"
                );
                *slot.lock() = Some(channel);
            })
        }));

        Ok(Self {
            peer_connection,
            events,
            config,
            state,
            data_channel,
            candidates: Mutex::new(CandidateBuffer::default()),
        })
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        *self.state.borrow()
    }

    /// The negotiated data channel: ours on the offering side, the remote's
    /// once it opens on the answering side.
    pub fn data_channel(&self) -> Option<Arc<RTCDataChannel>> {
        self.data_channel.lock().clone()
    }

    /// Start negotiation as the offering side. The offer SDP is emitted as
    /// [`LocalEvent::OfferReady`].
    pub async fn create_offer(&self) -> Result<(), WebRtcError> {
        if self.data_channel().is_none() {
            let channel = self
                .peer_connection
                .create_data_channel(
                    &self.config.data_channel_label,
                    Some(RTCDataChannelInit {
                        ordered: Some(self.config.ordered),
                        ..Default::default()
                    }),
                )
                .await?;
            *self.data_channel.lock() = Some(channel);
        }

        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection.set_local_description(offer).await?;
        let sdp = self.local_sdp().await?;
        tracing::debug!(target = "signaling_webrtc", bytes = sdp.len(), "local offer ready");
        self.events
            .send(LocalEvent::OfferReady(sdp))
            .map_err(|_| WebRtcError::EventsClosed)
    }

    /// Resolve once the peer connection reports `Connected`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), WebRtcError> {
        let mut state = self.state.clone();
        let wait = async move {
            loop {
                let current = *state.borrow_and_update();
                match current {
                    RTCPeerConnectionState::Connected => return Ok(()),
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                        return Err(WebRtcError::Failed(current));
                    }
                    _ => {}
                }
                if state.changed().await.is_err() {
                    return Err(WebRtcError::Failed(current));
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| WebRtcError::Timeout(timeout))?
    }

    pub async fn close(&self) -> Result<(), WebRtcError> {
        self.peer_connection.close().await?;
        Ok(())
    }

    async fn local_sdp(&self) -> Result<String, WebRtcError> {
        self.peer_connection
            .local_description()
            .await
            .map(|description| description.sdp)
            .ok_or(WebRtcError::MissingLocalDescription)
    }

    #[cfg(test)]
    fn pending_candidates(&self) -> usize {
        self.candidates.lock().pending.len()
    }
}

#[async_trait]
impl Negotiator for WebRtcNegotiator {
    async fn set_remote_description(
        &self,
        kind: SdpKind,
        sdp: String,
    ) -> Result<(), NegotiationError> {
        let description = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp),
            SdpKind::Answer => RTCSessionDescription::answer(sdp),
        }
        .map_err(rejected)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(rejected)?;

        let buffered = {
            let mut candidates = self.candidates.lock();
            candidates.remote_description_set = true;
            std::mem::take(&mut candidates.pending)
        };
        if !buffered.is_empty() {
            tracing::debug!(
                target = "signaling_webrtc",
                count = buffered.len(),
                "applying buffered remote candidates"
            );
        }
        for candidate in buffered {
            if let Err(err) = self.peer_connection.add_ice_candidate(candidate).await {
                tracing::warn!(
                    target = "signaling_webrtc",
                    error = %err,
                    "buffered remote candidate rejected"
                );
            }
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<(), NegotiationError> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(rejected)?;
        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(rejected)?;
        let sdp = self
            .local_sdp()
            .await
            .map_err(|err| NegotiationError::Rejected(err.to_string()))?;
        tracing::debug!(target = "signaling_webrtc", bytes = sdp.len(), "local answer ready");
        self.events
            .send(LocalEvent::AnswerReady(sdp))
            .map_err(|_| NegotiationError::Closed)
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidateFields,
    ) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };
        {
            let mut candidates = self.candidates.lock();
            if !candidates.remote_description_set {
                tracing::trace!(
                    target = "signaling_webrtc",
                    "remote description not set yet; buffering candidate"
                );
                candidates.pending.push(init);
                return Ok(());
            }
        }
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(rejected)
    }
}

fn rejected(err: webrtc::Error) -> NegotiationError {
    NegotiationError::Rejected(err.to_string())
}
