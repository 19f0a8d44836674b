use thiserror::Error;

/// Failures turning wire bytes into signaling messages (and back).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid signaling json: {0}")]
    InvalidJson(String),
    #[error("{kind} message carries an empty payload")]
    EmptyPayload { kind: &'static str },
    #[error("ice payload has {found} non-empty fields, expected 3")]
    IceFieldCount { found: usize },
    #[error("invalid ice line index {0:?}")]
    IceLineIndex(String),
    #[error("ice {0} field is empty")]
    EmptyIceField(&'static str),
    #[error("ice separator must not be empty")]
    EmptySeparator,
    #[error("ice separator {separator:?} occurs inside the {field} field")]
    SeparatorCollision {
        separator: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay returned {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("relay request failed: {0}")]
    Request(String),
    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

impl RelayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("relay address is not configured")]
    MissingRelayUrl,
    #[error("invalid relay address {url:?}: {reason}")]
    InvalidRelayUrl { url: String, reason: String },
    #[error("{0} peer id is empty")]
    EmptyPeerId(&'static str),
    #[error("ice separator must not be empty")]
    EmptySeparator,
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
}

/// Rejections reported by the media negotiation component.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("negotiation rejected: {0}")]
    Rejected(String),
    #[error("negotiator closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("signaling session must start inside a tokio runtime")]
    NoRuntime,
}

pub type SignalingResult<T> = Result<T, SignalingError>;
