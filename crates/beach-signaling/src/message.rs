//! Wire format for messages exchanged through the relay.
//!
//! One JSON object per message:
//!
//! ```text
//! { "MessageType": "Offer" | "Answer" | "Ice", "Data": "...", "IceDataSeparator": "|" }
//! ```
//!
//! `IceDataSeparator` is only written for `Ice` messages. ICE candidates travel
//! as a single `Data` string: `<candidate><sep><mline index><sep><mid>`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

pub const DEFAULT_ICE_SEPARATOR: &str = "|";

const WIRE_OFFER: &str = "Offer";
const WIRE_ANSWER: &str = "Answer";
const WIRE_ICE: &str = "Ice";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Offer,
    Answer,
    IceCandidate,
    /// A type name this client does not understand. Kept verbatim so newer
    /// relays and peers do not break older clients.
    Unrecognized(String),
}

impl MessageKind {
    pub fn wire_name(&self) -> &str {
        match self {
            MessageKind::Offer => WIRE_OFFER,
            MessageKind::Answer => WIRE_ANSWER,
            MessageKind::IceCandidate => WIRE_ICE,
            MessageKind::Unrecognized(name) => name,
        }
    }

    pub fn from_wire(name: &str) -> Self {
        match name {
            WIRE_OFFER => MessageKind::Offer,
            WIRE_ANSWER => MessageKind::Answer,
            WIRE_ICE => MessageKind::IceCandidate,
            other => MessageKind::Unrecognized(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub kind: MessageKind,
    pub payload: String,
    pub ice_separator: Option<String>,
}

impl SignalingMessage {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Offer,
            payload: sdp.into(),
            ice_separator: None,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Answer,
            payload: sdp.into(),
            ice_separator: None,
        }
    }

    pub fn ice_candidate(
        fields: &IceCandidateFields,
        separator: &str,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            kind: MessageKind::IceCandidate,
            payload: encode_ice_fields(fields, separator)?,
            ice_separator: Some(separator.to_string()),
        })
    }

    /// Separator for the composite ICE payload, falling back to the default
    /// when the sender omitted it.
    pub fn separator(&self) -> &str {
        self.ice_separator
            .as_deref()
            .filter(|sep| !sep.is_empty())
            .unwrap_or(DEFAULT_ICE_SEPARATOR)
    }

    pub fn ice_fields(&self) -> Result<IceCandidateFields, CodecError> {
        decode_ice_fields(&self.payload, self.separator())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "Data", default)]
    data: String,
    #[serde(
        rename = "IceDataSeparator",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    ice_data_separator: Option<String>,
}

pub fn encode(message: &SignalingMessage) -> Result<Bytes, CodecError> {
    let ice_data_separator = match message.kind {
        MessageKind::IceCandidate => message.ice_separator.clone(),
        _ => None,
    };
    let wire = WireMessage {
        message_type: message.kind.wire_name().to_string(),
        data: message.payload.clone(),
        ice_data_separator,
    };
    serde_json::to_vec(&wire)
        .map(Bytes::from)
        .map_err(|err| CodecError::InvalidJson(err.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<SignalingMessage, CodecError> {
    let wire: WireMessage =
        serde_json::from_slice(bytes).map_err(|err| CodecError::InvalidJson(err.to_string()))?;
    let kind = MessageKind::from_wire(&wire.message_type);
    match kind {
        MessageKind::Offer | MessageKind::Answer if wire.data.is_empty() => {
            return Err(CodecError::EmptyPayload {
                kind: if kind == MessageKind::Offer {
                    WIRE_OFFER
                } else {
                    WIRE_ANSWER
                },
            });
        }
        _ => {}
    }
    let ice_separator = match kind {
        MessageKind::IceCandidate => wire.ice_data_separator,
        _ => None,
    };
    Ok(SignalingMessage {
        kind,
        payload: wire.data,
        ice_separator,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidateFields {
    pub candidate: String,
    pub sdp_mline_index: u16,
    pub sdp_mid: String,
}

impl IceCandidateFields {
    pub fn new(candidate: impl Into<String>, sdp_mline_index: u16, sdp_mid: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mline_index,
            sdp_mid: sdp_mid.into(),
        }
    }
}

/// Joins candidate, line index and mid. Refuses separators that occur inside
/// the candidate or mid, since the receiver could not split them back apart.
pub fn encode_ice_fields(
    fields: &IceCandidateFields,
    separator: &str,
) -> Result<String, CodecError> {
    if separator.is_empty() {
        return Err(CodecError::EmptySeparator);
    }
    if fields.candidate.is_empty() {
        return Err(CodecError::EmptyIceField("candidate"));
    }
    if fields.sdp_mid.is_empty() {
        return Err(CodecError::EmptyIceField("mid"));
    }
    for (field, value) in [("candidate", &fields.candidate), ("mid", &fields.sdp_mid)] {
        if value.contains(separator) {
            return Err(CodecError::SeparatorCollision {
                separator: separator.to_string(),
                field,
            });
        }
    }
    Ok(format!(
        "{}{separator}{}{separator}{}",
        fields.candidate, fields.sdp_mline_index, fields.sdp_mid
    ))
}

/// Splits a composite ICE payload. Empty segments are discarded; fewer than
/// three remaining segments is malformed.
pub fn decode_ice_fields(payload: &str, separator: &str) -> Result<IceCandidateFields, CodecError> {
    if separator.is_empty() {
        return Err(CodecError::EmptySeparator);
    }
    let parts: Vec<&str> = payload
        .split(separator)
        .filter(|segment| !segment.is_empty())
        .collect();
    let [candidate, index, mid, ..] = parts.as_slice() else {
        return Err(CodecError::IceFieldCount { found: parts.len() });
    };
    let sdp_mline_index = index
        .trim()
        .parse::<u16>()
        .map_err(|_| CodecError::IceLineIndex(index.to_string()))?;
    Ok(IceCandidateFields {
        candidate: candidate.to_string(),
        sdp_mline_index,
        sdp_mid: mid.to_string(),
    })
}
