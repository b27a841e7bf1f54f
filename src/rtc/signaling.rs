//! Relay Signaling Protocol
//!
//! Named events exchanged with the signaling relay. Every frame on the wire
//! is a JSON envelope `{"event": <name>, "data": <payload>}`.

use super::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Relay-assigned participant id, valid for one relay connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description in the browser's `{type, sdp}` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }
}

/// ICE candidate in the browser's `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }
}

/// Advisory UI hints sent to the partner; never needed for correctness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdvisorySignal {
    Mic { enabled: bool },
    Cam { enabled: bool },
    Screenshare { active: bool },
}

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Join { room_id: String },
    Leave,
    Offer { sdp: SessionDescription, to: PeerId },
    Answer { sdp: SessionDescription, to: PeerId },
    IceCandidate { candidate: IceCandidate, to: PeerId },
    Signal(AdvisorySignal),
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::Join { .. } => "join",
            OutboundMessage::Leave => "leave",
            OutboundMessage::Offer { .. } => "offer",
            OutboundMessage::Answer { .. } => "answer",
            OutboundMessage::IceCandidate { .. } => "ice-candidate",
            OutboundMessage::Signal(_) => "signal",
        }
    }

    /// Serialize to a wire envelope
    pub fn to_json(&self) -> Result<String, SessionError> {
        let data = match self {
            OutboundMessage::Join { room_id } => json!({ "roomId": room_id }),
            OutboundMessage::Leave => json!({}),
            OutboundMessage::Offer { sdp, to } | OutboundMessage::Answer { sdp, to } => {
                json!({ "sdp": sdp, "to": to })
            }
            OutboundMessage::IceCandidate { candidate, to } => json!({ "candidate": candidate, "to": to }),
            OutboundMessage::Signal(signal) => serde_json::to_value(signal)
                .map_err(|e| SessionError::Signaling(format!("Failed to serialize signal: {}", e)))?,
        };
        serde_json::to_string(&json!({ "event": self.event_name(), "data": data }))
            .map_err(|e| SessionError::Signaling(format!("Failed to serialize message: {}", e)))
    }
}

/// Events received from the relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    RoomFull,
    PeerJoined { id: PeerId },
    Ready,
    Offer { sdp: SessionDescription, from: PeerId },
    Answer { sdp: SessionDescription, from: Option<PeerId> },
    IceCandidate { candidate: IceCandidate },
    Signal(Value),
    /// The relay transport closed
    Disconnected,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct PeerJoinedData {
    id: PeerId,
}

#[derive(Deserialize)]
struct OfferData {
    sdp: SessionDescription,
    from: PeerId,
}

#[derive(Deserialize)]
struct AnswerData {
    sdp: SessionDescription,
    #[serde(default)]
    from: Option<PeerId>,
}

#[derive(Deserialize)]
struct CandidateData {
    candidate: IceCandidate,
}

impl RelayEvent {
    /// Parse a relay envelope
    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        let envelope: Envelope = serde_json::from_str(text.trim())
            .map_err(|e| SessionError::Signaling(format!("Invalid relay message: {}", e)))?;

        let event = match envelope.event.as_str() {
            "room-full" => RelayEvent::RoomFull,
            "ready" => RelayEvent::Ready,
            "peer-joined" => {
                let data: PeerJoinedData = payload(&envelope)?;
                RelayEvent::PeerJoined { id: data.id }
            }
            "offer" => {
                let data: OfferData = payload(&envelope)?;
                RelayEvent::Offer { sdp: data.sdp, from: data.from }
            }
            "answer" => {
                let data: AnswerData = payload(&envelope)?;
                RelayEvent::Answer { sdp: data.sdp, from: data.from }
            }
            "ice-candidate" => {
                let data: CandidateData = payload(&envelope)?;
                RelayEvent::IceCandidate { candidate: data.candidate }
            }
            "signal" => RelayEvent::Signal(envelope.data),
            other => {
                return Err(SessionError::Signaling(format!("Unknown relay event: {}", other)));
            }
        };
        Ok(event)
    }
}

fn payload<T: for<'de> Deserialize<'de>>(envelope: &Envelope) -> Result<T, SessionError> {
    T::deserialize(&envelope.data)
        .map_err(|e| SessionError::Signaling(format!("Invalid {} payload: {}", envelope.event, e)))
}

/// Outbound half of the relay connection
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), SessionError>;
}
