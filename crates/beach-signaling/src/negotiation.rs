use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::NegotiationError;
use crate::message::IceCandidateFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// Local negotiation output that must be published to the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    IceCandidate(IceCandidateFields),
    OfferReady(String),
    AnswerReady(String),
}

pub type LocalEventSender = mpsc::UnboundedSender<LocalEvent>;
pub type LocalEventReceiver = mpsc::UnboundedReceiver<LocalEvent>;

/// Channel the media negotiation component raises [`LocalEvent`]s on.
pub fn local_event_channel() -> (LocalEventSender, LocalEventReceiver) {
    mpsc::unbounded_channel()
}

/// The media negotiation component (a peer connection). Misuse such as
/// applying an answer with no local offer is rejected here, not by the
/// signaling layer.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn set_remote_description(&self, kind: SdpKind, sdp: String)
    -> Result<(), NegotiationError>;

    /// Create a local answer. The answer SDP comes back through
    /// [`LocalEvent::AnswerReady`].
    async fn create_answer(&self) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidateFields)
    -> Result<(), NegotiationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferDecision {
    Answer,
    /// Leave the offer applied but unanswered; the host answers later.
    Defer,
}

/// Decides what happens after a remote offer has been applied.
pub trait AnswerPolicy: Send + Sync {
    fn on_remote_offer(&self, sdp: &str) -> OfferDecision;
}

/// Any offer implies consent to answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAnswer;

impl AnswerPolicy for AutoAnswer {
    fn on_remote_offer(&self, _sdp: &str) -> OfferDecision {
        OfferDecision::Answer
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManualAnswer;

impl AnswerPolicy for ManualAnswer {
    fn on_remote_offer(&self, _sdp: &str) -> OfferDecision {
        OfferDecision::Defer
    }
}

impl<F> AnswerPolicy for F
where
    F: Fn(&str) -> OfferDecision + Send + Sync,
{
    fn on_remote_offer(&self, sdp: &str) -> OfferDecision {
        self(sdp)
    }
}
