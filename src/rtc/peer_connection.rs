//! Peer connection capability
//!
//! The transport/ICE engine is reached only through these traits. Backends
//! report candidates, connectivity changes and remote tracks through an
//! explicitly registered `EventSink`.

use super::signaling::{IceCandidate, SessionDescription};
use super::SessionError;
use crate::ice::IceConfiguration;
use crate::media::{MediaTrack, TrackKind};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Connectivity as reported by the underlying engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectivityState {
    /// States that trigger the restart policy
    pub fn is_failure(&self) -> bool {
        matches!(self, ConnectivityState::Disconnected | ConnectivityState::Failed)
    }
}

/// A track received from the partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A local candidate was discovered
    LocalCandidate(IceCandidate),
    /// Connectivity changed
    StateChanged(ConnectivityState),
    /// The partner's media arrived
    RemoteTrack(RemoteTrack),
}

/// Connection event stamped with the epoch of the engine that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub epoch: u64,
    pub event: ConnectionEvent,
}

/// Observer handle given to a connection at engine construction
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Deliver an event; false once the receiving side is gone
    pub fn emit(&self, event: ConnectionEvent) -> bool {
        self.tx.send(EngineEvent { epoch: self.epoch, event }).is_ok()
    }
}

/// One underlying peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Register (`Some`) or detach (`None`) the event observer
    fn set_observer(&self, sink: Option<EventSink>);

    /// Attach a local track as a new sender
    async fn add_track(&self, track: &MediaTrack) -> Result<(), SessionError>;

    /// Swap the track carried by the sender of `kind` without renegotiation
    async fn replace_track(&self, kind: TrackKind, track: &MediaTrack) -> Result<(), SessionError>;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, SessionError>;

    async fn create_answer(&self) -> Result<SessionDescription, SessionError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SessionError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError>;

    /// Apply a remote candidate; refusals map to `CandidateRejected`
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError>;

    /// Detach every local track from its sender
    async fn stop_senders(&self);

    async fn close(&self) -> Result<(), SessionError>;
}

/// Builds a fresh connection per session
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, ice: &IceConfiguration) -> Result<Box<dyn PeerConnection>, SessionError>;
}
