use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{CodecError, ConfigError, SignalingError};
use crate::message::{self, MessageKind, SignalingMessage};
use crate::negotiation::{AnswerPolicy, LocalEvent, Negotiator, OfferDecision, SdpKind};
use crate::relay::Relay;

/// Problems surfaced to the host without interrupting the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    PublishFailed {
        peer: String,
        kind: MessageKind,
        error: String,
    },
    FetchFailed {
        peer: String,
        error: String,
    },
    Malformed {
        error: String,
    },
    Unrecognized {
        kind: String,
    },
    NegotiationFailed {
        kind: MessageKind,
        error: String,
    },
    PollingHalted,
}

pub type DiagnosticSink = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Where the handshake stands, as observed from the traffic. Informational
/// only; the negotiator enforces ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    Idle,
    OfferSent,
    OfferReceived,
    Answered,
    /// Set by the host via [`Dispatcher::mark_connected`]; no relay message
    /// carries it.
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    RemoteOffer { answered: bool },
    RemoteAnswer,
    Candidate,
    Dropped,
}

pub struct Dispatcher {
    negotiator: Arc<dyn Negotiator>,
    relay: Arc<dyn Relay>,
    remote_peer: RwLock<String>,
    ice_separator: String,
    policy: Arc<dyn AnswerPolicy>,
    phase: Mutex<NegotiationPhase>,
    diagnostics: Option<DiagnosticSink>,
    closed: AtomicBool,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("remote_peer", &*self.remote_peer.read())
            .field("ice_separator", &self.ice_separator)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        negotiator: Arc<dyn Negotiator>,
        relay: Arc<dyn Relay>,
        remote_peer: impl Into<String>,
        ice_separator: impl Into<String>,
        policy: Arc<dyn AnswerPolicy>,
        diagnostics: Option<DiagnosticSink>,
    ) -> Self {
        Self {
            negotiator,
            relay,
            remote_peer: RwLock::new(remote_peer.into()),
            ice_separator: ice_separator.into(),
            policy,
            phase: Mutex::new(NegotiationPhase::Idle),
            diagnostics,
            closed: AtomicBool::new(false),
        }
    }

    pub fn remote_peer(&self) -> String {
        self.remote_peer.read().clone()
    }

    /// Retarget future publishes. Publishes already addressed keep their peer.
    pub fn set_remote_peer(&self, peer: impl Into<String>) -> Result<(), ConfigError> {
        let peer = peer.into();
        if peer.trim().is_empty() {
            return Err(ConfigError::EmptyPeerId("remote"));
        }
        tracing::debug!(target = "beach_signaling::dispatcher", peer = %peer, "remote peer changed");
        *self.remote_peer.write() = peer;
        Ok(())
    }

    pub fn phase(&self) -> NegotiationPhase {
        *self.phase.lock()
    }

    pub fn mark_connected(&self) {
        self.set_phase(NegotiationPhase::Connected);
    }

    /// Silence diagnostics from operations that finish after the owning
    /// session closed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        if self.is_closed() {
            tracing::trace!(
                target = "beach_signaling::dispatcher",
                ?diagnostic,
                "suppressing diagnostic after close"
            );
            return;
        }
        if let Some(sink) = &self.diagnostics {
            sink(&diagnostic);
        }
    }

    /// Decode a fetched body and route it. Undecodable bodies are dropped.
    pub async fn dispatch_raw(&self, body: &[u8]) -> Result<Routed, SignalingError> {
        match message::decode(body) {
            Ok(message) => self.route(message).await,
            Err(err) => {
                tracing::warn!(
                    target = "beach_signaling::dispatcher",
                    error = %err,
                    "dropping undecodable signaling message"
                );
                self.report(Diagnostic::Malformed {
                    error: err.to_string(),
                });
                Ok(Routed::Dropped)
            }
        }
    }

    pub async fn route(&self, message: SignalingMessage) -> Result<Routed, SignalingError> {
        let kind = message.kind.clone();
        match kind {
            MessageKind::Offer => {
                tracing::debug!(target = "beach_signaling::dispatcher", "applying remote offer");
                self.apply_remote(MessageKind::Offer, SdpKind::Offer, message.payload.clone())
                    .await?;
                self.set_phase(NegotiationPhase::OfferReceived);
                match self.policy.on_remote_offer(&message.payload) {
                    OfferDecision::Answer => {
                        if let Err(err) = self.negotiator.create_answer().await {
                            tracing::warn!(
                                target = "beach_signaling::dispatcher",
                                error = %err,
                                "failed to create answer"
                            );
                            self.report(Diagnostic::NegotiationFailed {
                                kind: MessageKind::Offer,
                                error: err.to_string(),
                            });
                            return Err(err.into());
                        }
                        Ok(Routed::RemoteOffer { answered: true })
                    }
                    OfferDecision::Defer => {
                        tracing::debug!(
                            target = "beach_signaling::dispatcher",
                            "answer deferred by policy"
                        );
                        Ok(Routed::RemoteOffer { answered: false })
                    }
                }
            }
            MessageKind::Answer => {
                tracing::debug!(target = "beach_signaling::dispatcher", "applying remote answer");
                self.apply_remote(MessageKind::Answer, SdpKind::Answer, message.payload)
                    .await?;
                self.set_phase(NegotiationPhase::Answered);
                Ok(Routed::RemoteAnswer)
            }
            MessageKind::IceCandidate => {
                let fields = match message.ice_fields() {
                    Ok(fields) => fields,
                    Err(err) => {
                        tracing::warn!(
                            target = "beach_signaling::dispatcher",
                            error = %err,
                            "dropping malformed ice candidate"
                        );
                        self.report(Diagnostic::Malformed {
                            error: err.to_string(),
                        });
                        return Ok(Routed::Dropped);
                    }
                };
                tracing::trace!(
                    target = "beach_signaling::dispatcher",
                    mid = %fields.sdp_mid,
                    mline = fields.sdp_mline_index,
                    "adding remote ice candidate"
                );
                if let Err(err) = self.negotiator.add_ice_candidate(fields).await {
                    tracing::warn!(
                        target = "beach_signaling::dispatcher",
                        error = %err,
                        "failed to add remote ice candidate"
                    );
                    self.report(Diagnostic::NegotiationFailed {
                        kind: MessageKind::IceCandidate,
                        error: err.to_string(),
                    });
                    return Err(err.into());
                }
                Ok(Routed::Candidate)
            }
            MessageKind::Unrecognized(kind) => {
                tracing::warn!(
                    target = "beach_signaling::dispatcher",
                    kind = %kind,
                    "dropping unrecognized signaling message"
                );
                self.report(Diagnostic::Unrecognized { kind });
                Ok(Routed::Dropped)
            }
        }
    }

    /// Publish to whichever remote peer is configured right now.
    pub async fn publish_local(&self, event: LocalEvent) -> Result<(), SignalingError> {
        let peer = self.remote_peer();
        self.publish_local_to(&peer, event).await
    }

    pub async fn publish_local_to(
        &self,
        peer: &str,
        event: LocalEvent,
    ) -> Result<(), SignalingError> {
        let message = match self.outbound_message(event) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(
                    target = "beach_signaling::dispatcher",
                    error = %err,
                    "refusing to publish unencodable local event"
                );
                self.report(Diagnostic::Malformed {
                    error: err.to_string(),
                });
                return Err(err.into());
            }
        };
        let body = message::encode(&message)?;
        match self.relay.publish(peer, body).await {
            Ok(()) => {
                tracing::debug!(
                    target = "beach_signaling::dispatcher",
                    peer,
                    kind = message.kind.wire_name(),
                    "published signaling message"
                );
                match message.kind {
                    MessageKind::Offer => self.set_phase(NegotiationPhase::OfferSent),
                    MessageKind::Answer => self.set_phase(NegotiationPhase::Answered),
                    _ => {}
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    target = "beach_signaling::dispatcher",
                    peer,
                    kind = message.kind.wire_name(),
                    error = %err,
                    "publish failed"
                );
                self.report(Diagnostic::PublishFailed {
                    peer: peer.to_string(),
                    kind: message.kind,
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    fn outbound_message(&self, event: LocalEvent) -> Result<SignalingMessage, CodecError> {
        match event {
            LocalEvent::IceCandidate(fields) => {
                SignalingMessage::ice_candidate(&fields, &self.ice_separator)
            }
            LocalEvent::OfferReady(sdp) => Ok(SignalingMessage::offer(sdp)),
            LocalEvent::AnswerReady(sdp) => Ok(SignalingMessage::answer(sdp)),
        }
    }

    async fn apply_remote(
        &self,
        kind: MessageKind,
        sdp_kind: SdpKind,
        sdp: String,
    ) -> Result<(), SignalingError> {
        if let Err(err) = self.negotiator.set_remote_description(sdp_kind, sdp).await {
            tracing::warn!(
                target = "beach_signaling::dispatcher",
                sdp_kind = sdp_kind.as_str(),
                error = %err,
                "remote description rejected"
            );
            self.report(Diagnostic::NegotiationFailed {
                kind,
                error: err.to_string(),
            });
            return Err(err.into());
        }
        Ok(())
    }

    fn set_phase(&self, phase: NegotiationPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            tracing::debug!(
                target = "beach_signaling::dispatcher",
                from = ?*current,
                to = ?phase,
                "negotiation phase"
            );
            *current = phase;
        }
    }
}
