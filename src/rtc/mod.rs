//! 1:1 call negotiation
//!
//! This module provides the peer session core:
//! - Relay signaling messages and the outbound channel trait
//! - The peer connection capability trait
//! - Offer/answer sequencing and candidate buffering
//! - The session state machine and its command handle

pub mod signaling;
pub mod peer_connection;
pub mod negotiation;
pub mod session;
pub mod controller;

#[cfg(feature = "webrtc-rs")]
pub mod rtc_backend;

pub use controller::{PictureInPicture, SessionController, SessionHandle};
pub use negotiation::{NegotiationEngine, NegotiationState};
pub use peer_connection::{ConnectionFactory, ConnectionEvent, ConnectivityState, PeerConnection};
pub use session::{ConnectionState, Session, SessionNotification};
pub use signaling::{OutboundMessage, RelayEvent, SignalingChannel};

use crate::media::{MediaError, TrackKind};
use std::error::Error;
use std::fmt;

/// Call session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Camera, microphone or screen could not be opened
    MediaAcquisition(MediaError),
    /// An offer/answer round is already in flight
    NegotiationInProgress,
    /// An answer arrived with no offer outstanding
    UnexpectedAnswer,
    /// The connection refused a remote candidate
    CandidateRejected(String),
    /// Connectivity failed again after the single restart attempt
    ConnectivityFailed,
    /// The room already holds two participants
    RoomFull,
    /// Platform lacks the capability (screen share, picture-in-picture)
    UnsupportedCapability(String),
    /// Room id empty after trimming
    InvalidRoom,
    /// Command not valid in the current state
    InvalidState(String),
    /// No local track of that kind exists in this session
    TrackUnavailable(TrackKind),
    /// Relay transport failure
    Signaling(String),
    /// Underlying connection failure (SDP creation/application, close)
    Connection(String),
    /// ICE server configuration could not be obtained
    IceConfig(String),
    /// The controller task has stopped
    ControllerGone,
}

impl SessionError {
    /// Stable identifier used in error notifications
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::MediaAcquisition(_) => "media-acquisition",
            SessionError::NegotiationInProgress => "negotiation-in-progress",
            SessionError::UnexpectedAnswer => "unexpected-answer",
            SessionError::CandidateRejected(_) => "candidate-rejected",
            SessionError::ConnectivityFailed => "connectivity-failed",
            SessionError::RoomFull => "room-full",
            SessionError::UnsupportedCapability(_) => "unsupported-capability",
            SessionError::InvalidRoom => "invalid-room",
            SessionError::InvalidState(_) => "invalid-state",
            SessionError::TrackUnavailable(_) => "track-unavailable",
            SessionError::Signaling(_) => "signaling",
            SessionError::Connection(_) => "connection",
            SessionError::IceConfig(_) => "ice-config",
            SessionError::ControllerGone => "controller-gone",
        }
    }

    /// Errors that end the session and leave it in `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionError::ConnectivityFailed | SessionError::RoomFull)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MediaAcquisition(err) => write!(f, "Media acquisition failed: {}", err),
            SessionError::NegotiationInProgress => write!(f, "Negotiation already in progress"),
            SessionError::UnexpectedAnswer => write!(f, "Received answer with no offer outstanding"),
            SessionError::CandidateRejected(msg) => write!(f, "ICE candidate rejected: {}", msg),
            SessionError::ConnectivityFailed => write!(f, "Connectivity failed after restart attempt"),
            SessionError::RoomFull => write!(f, "Room already has 2 participants"),
            SessionError::UnsupportedCapability(msg) => write!(f, "Unsupported capability: {}", msg),
            SessionError::InvalidRoom => write!(f, "Room ID required"),
            SessionError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            SessionError::TrackUnavailable(kind) => write!(f, "No local {} track", kind),
            SessionError::Signaling(msg) => write!(f, "Signaling error: {}", msg),
            SessionError::Connection(msg) => write!(f, "Connection error: {}", msg),
            SessionError::IceConfig(msg) => write!(f, "ICE configuration error: {}", msg),
            SessionError::ControllerGone => write!(f, "Session controller has stopped"),
        }
    }
}

impl Error for SessionError {}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotSupported(msg) => SessionError::UnsupportedCapability(msg),
            other => SessionError::MediaAcquisition(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_room_full_and_connectivity_are_terminal() {
        assert!(SessionError::RoomFull.is_terminal());
        assert!(SessionError::ConnectivityFailed.is_terminal());
        assert!(!SessionError::UnexpectedAnswer.is_terminal());
        assert!(!SessionError::CandidateRejected("bad".into()).is_terminal());
    }

    #[test]
    fn unsupported_media_maps_to_capability_error() {
        let err: SessionError = MediaError::NotSupported("screen".into()).into();
        assert_eq!(err.kind(), "unsupported-capability");
        let err: SessionError = MediaError::PermissionDenied("camera".into()).into();
        assert_eq!(err.kind(), "media-acquisition");
    }
}
