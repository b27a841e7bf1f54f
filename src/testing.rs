//! Recording collaborators for unit tests

use crate::ice::IceConfiguration;
use crate::media::{MediaTrack, TrackKind};
use crate::rtc::controller::PictureInPicture;
use crate::rtc::peer_connection::{ConnectionEvent, ConnectionFactory, EventSink, PeerConnection};
use crate::rtc::signaling::{AdvisorySignal, IceCandidate, OutboundMessage, SessionDescription, SignalingChannel};
use crate::rtc::SessionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    observer: Option<EventSink>,
    senders: HashMap<TrackKind, MediaTrack>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
    offers_created: usize,
    ice_restarts: usize,
    close_count: usize,
}

/// In-memory connection that records every call
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire an event through the registered observer, as a backend would
    pub fn emit(&self, event: ConnectionEvent) -> bool {
        let sink = self.state.lock().observer.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    pub fn observer(&self) -> Option<EventSink> {
        self.state.lock().observer.clone()
    }

    pub fn observer_attached(&self) -> bool {
        self.state.lock().observer.is_some()
    }

    pub fn sender(&self, kind: TrackKind) -> Option<MediaTrack> {
        self.state.lock().senders.get(&kind).cloned()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().remote.clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().candidates.clone()
    }

    pub fn ice_restarts(&self) -> usize {
        self.state.lock().ice_restarts
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().close_count > 0
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().calls.push(call.into());
    }
}

#[async_trait]
impl PeerConnection for MockConnection {
    fn set_observer(&self, sink: Option<EventSink>) {
        let mut state = self.state.lock();
        state.calls.push(if sink.is_some() { "set_observer(Some)" } else { "set_observer(None)" }.to_string());
        state.observer = sink;
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        self.record(format!("add_track({})", track.kind()));
        self.state.lock().senders.insert(track.kind(), track.clone());
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: &MediaTrack) -> Result<(), SessionError> {
        self.record(format!("replace_track({})", kind));
        let mut state = self.state.lock();
        match state.senders.get_mut(&kind) {
            Some(slot) => {
                *slot = track.clone();
                Ok(())
            }
            None => Err(SessionError::Connection(format!("no {} sender", kind))),
        }
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, SessionError> {
        self.record("create_offer");
        let mut state = self.state.lock();
        state.offers_created += 1;
        if ice_restart {
            state.ice_restarts += 1;
        }
        Ok(SessionDescription::offer(format!("v=0 offer {}", state.offers_created)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        self.record("create_answer");
        if self.state.lock().remote.is_none() {
            return Err(SessionError::Connection("no remote description".to_string()));
        }
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.record("set_local_description");
        self.state.lock().local = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.record("set_remote_description");
        self.state.lock().remote = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.record("add_ice_candidate");
        let mut state = self.state.lock();
        if state.remote.is_none() {
            return Err(SessionError::CandidateRejected("remote description not set".to_string()));
        }
        if candidate.candidate.contains("malformed") {
            return Err(SessionError::CandidateRejected(candidate.candidate));
        }
        state.candidates.push(candidate);
        Ok(())
    }

    async fn stop_senders(&self) {
        self.record("stop_senders");
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.record("close");
        self.state.lock().close_count += 1;
        Ok(())
    }
}

/// Hands out `MockConnection`s and keeps them for inspection
#[derive(Default)]
pub struct MockFactory {
    created: Mutex<Vec<MockConnection>>,
    fail: AtomicBool,
}

impl MockFactory {
    pub fn connections(&self) -> Vec<MockConnection> {
        self.created.lock().clone()
    }

    pub fn last(&self) -> MockConnection {
        self.created.lock().last().cloned().expect("no connection created")
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self, _ice: &IceConfiguration) -> Result<Box<dyn PeerConnection>, SessionError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(SessionError::Connection("factory refused".to_string()));
        }
        let connection = MockConnection::new();
        self.created.lock().push(connection.clone());
        Ok(Box::new(connection))
    }
}

/// Signaling channel that records outbound messages
#[derive(Default)]
pub struct RecordingSignaling {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: AtomicBool,
}

impl RecordingSignaling {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn offers(&self) -> Vec<OutboundMessage> {
        self.filtered(|m| matches!(m, OutboundMessage::Offer { .. }))
    }

    pub fn answers(&self) -> Vec<OutboundMessage> {
        self.filtered(|m| matches!(m, OutboundMessage::Answer { .. }))
    }

    pub fn signals(&self) -> Vec<AdvisorySignal> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::Signal(signal) => Some(signal.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.sent.lock().iter().filter(|m| m.event_name() == event).count()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    fn filtered(&self, keep: impl Fn(&OutboundMessage) -> bool) -> Vec<OutboundMessage> {
        self.sent.lock().iter().filter(|m| keep(m)).cloned().collect()
    }
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(SessionError::Signaling("relay unreachable".to_string()));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

/// Picture-in-picture collaborator that counts requests
#[derive(Default)]
pub struct PipRecorder {
    pub requests: AtomicUsize,
    pub exits: AtomicUsize,
}

#[async_trait]
impl PictureInPicture for PipRecorder {
    async fn request(&self) -> Result<(), SessionError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn exit(&self) -> Result<(), SessionError> {
        self.exits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
