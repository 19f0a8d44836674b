//! Peer-to-peer session signaling over a polled relay.
//!
//! Two peers exchange offers, answers and ICE candidates through a relay that
//! only supports "put a message for peer X" and "get the pending message for
//! peer Y". Inbound traffic is polled on a cadence the host drives; outbound
//! traffic is published as the local negotiator produces it.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod negotiation;
pub mod poll;
pub mod relay;
pub mod session;
pub mod track;

pub use config::SignalingConfig;
pub use dispatcher::{Diagnostic, Dispatcher, NegotiationPhase, Routed};
pub use error::{CodecError, ConfigError, NegotiationError, RelayError, SignalingError};
pub use message::{IceCandidateFields, MessageKind, SignalingMessage};
pub use negotiation::{LocalEvent, Negotiator, SdpKind, local_event_channel};
pub use relay::{HttpRelay, MemoryRelay, Relay};
pub use session::SignalingSession;
