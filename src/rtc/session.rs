//! Call session state
//!
//! The local participant's view of one call, built on join and dropped on
//! leave, plus the notifications emitted to the UI.

use super::negotiation::NegotiationEngine;
use super::peer_connection::RemoteTrack;
use super::signaling::PeerId;
use super::SessionError;
use crate::ice::IceConfiguration;
use crate::media::{LocalMedia, MediaTrack, TrackKind};
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Call state as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session
    Idle,
    /// Room joined, waiting for the partner
    Joining,
    /// Offer/answer in progress
    Negotiating,
    /// Media flowing
    Connected,
    /// Single ICE restart in progress
    Reconnecting,
    /// Left; ready for a new join
    Closed,
    /// Room full or connectivity lost; only `leave` is valid
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Joining => "joining",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }

    /// A new session may be started
    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Closed)
    }

    /// A session exists and still carries media
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Joining
                | ConnectionState::Negotiating
                | ConnectionState::Connected
                | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications for the UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    StateChanged { from: ConnectionState, to: ConnectionState },
    TrackToggled { kind: TrackKind, enabled: bool },
    DeviceSwitched { device_id: String },
    ScreenShareChanged { active: bool },
    RemoteTrackAdded(RemoteTrack),
    /// Advisory payload from the partner (mute state, screen share)
    PartnerSignal(Value),
    Error { kind: &'static str, message: String },
}

impl SessionNotification {
    pub fn error(err: &SessionError) -> Self {
        SessionNotification::Error { kind: err.kind(), message: err.to_string() }
    }
}

pub struct Session {
    pub room_id: String,
    pub partner_id: Option<PeerId>,
    pub local: LocalMedia,
    /// Screen capture currently feeding the video sender
    pub screen_track: Option<MediaTrack>,
    pub remote_tracks: Vec<RemoteTrack>,
    /// A restart was requested while an offer was outstanding
    pub pending_renegotiation: bool,
    /// The single ICE restart has been used since the last `connected`
    pub restart_attempted: bool,
    /// Selected video input; `None` is the platform default
    pub device_selection: Option<String>,
    pub ice: IceConfiguration,
    pub engine: NegotiationEngine,
    pub started_at: Instant,
    screen_watch: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(room_id: String, ice: IceConfiguration, local: LocalMedia, engine: NegotiationEngine) -> Self {
        let device_selection = local.video.as_ref().and_then(|t| t.device_id().map(str::to_string));
        Self {
            room_id,
            partner_id: None,
            local,
            screen_track: None,
            remote_tracks: Vec::new(),
            pending_renegotiation: false,
            restart_attempted: false,
            device_selection,
            ice,
            engine,
            started_at: Instant::now(),
            screen_watch: None,
        }
    }

    /// Local tracks this session must release on leave, screen included
    pub fn owned_tracks(&self) -> Vec<MediaTrack> {
        self.local.tracks().chain(self.screen_track.iter()).cloned().collect()
    }

    pub fn is_sharing_screen(&self) -> bool {
        self.screen_track.is_some()
    }

    pub fn set_screen_watch(&mut self, handle: JoinHandle<()>) {
        self.stop_screen_watch();
        self.screen_watch = Some(handle);
    }

    pub fn stop_screen_watch(&mut self) {
        if let Some(handle) = self.screen_watch.take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_screen_watch();
    }
}
