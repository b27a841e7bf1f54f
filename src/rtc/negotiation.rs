//! Offer/answer negotiation
//!
//! Owns the session's single peer connection and sequences description
//! exchange over it:
//! - at most one offer/answer round in flight
//! - remote candidates held back until a remote description exists
//! - local candidates held back until the partner is known
//! - observers detached before the connection closes

use super::peer_connection::{EngineEvent, EventSink, PeerConnection};
use super::signaling::{IceCandidate, OutboundMessage, PeerId, SessionDescription, SignalingChannel};
use super::SessionError;
use crate::media::{LocalMedia, MediaTrack, TrackKind};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Negotiation round state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No description exchanged yet
    Idle,
    /// Local offer sent, awaiting the answer
    OfferPending,
    /// Remote offer answered, awaiting connectivity
    AnswerSent,
    /// Round complete
    Stable,
    /// Torn down; terminal
    Closed,
}

pub struct NegotiationEngine {
    epoch: u64,
    connection: Box<dyn PeerConnection>,
    signaling: Arc<dyn SignalingChannel>,
    state: NegotiationState,
    partner: Option<PeerId>,
    initiator: bool,
    has_remote_description: bool,
    pending_remote: Vec<IceCandidate>,
    pending_local: Vec<IceCandidate>,
}

impl NegotiationEngine {
    /// Bind a fresh connection: register the observer, then attach local tracks
    pub async fn new(
        epoch: u64,
        connection: Box<dyn PeerConnection>,
        signaling: Arc<dyn SignalingChannel>,
        local: &LocalMedia,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self, SessionError> {
        connection.set_observer(Some(EventSink::new(epoch, events)));

        for track in local.tracks() {
            if let Err(e) = connection.add_track(track).await {
                connection.set_observer(None);
                let _ = connection.close().await;
                return Err(e);
            }
        }

        debug!("Negotiation engine {} ready with {} local tracks", epoch, local.tracks().count());

        Ok(Self {
            epoch,
            connection,
            signaling,
            state: NegotiationState::Idle,
            partner: None,
            initiator: false,
            has_remote_description: false,
            pending_remote: Vec::new(),
            pending_local: Vec::new(),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn partner(&self) -> Option<&PeerId> {
        self.partner.as_ref()
    }

    /// This side sent the first offer of the current partnership
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn pending_remote_candidates(&self) -> usize {
        self.pending_remote.len()
    }

    pub fn pending_local_candidates(&self) -> usize {
        self.pending_local.len()
    }

    /// Record the partner and flush local candidates buffered until now
    pub async fn set_partner(&mut self, partner: PeerId) {
        if self.partner.as_ref() == Some(&partner) {
            return;
        }
        self.partner = Some(partner);
        self.flush_local_candidates().await;
    }

    /// Address a different partner. An offer sent to the previous partner
    /// will never be answered, so that round is abandoned. The previous
    /// partner's description no longer gates candidates: they wait for the
    /// new partner's offer or answer.
    pub async fn rebind_partner(&mut self, partner: PeerId) {
        if self.partner.as_ref() == Some(&partner) {
            return;
        }
        if self.state == NegotiationState::OfferPending {
            info!("Abandoning offer round for previous partner");
            self.state = NegotiationState::Idle;
        }
        self.has_remote_description = false;
        self.pending_remote.clear();
        self.set_partner(partner).await;
    }

    /// Create, apply and send an offer to the partner
    pub async fn originate_offer(&mut self) -> Result<(), SessionError> {
        match self.state {
            NegotiationState::Idle => {}
            NegotiationState::OfferPending | NegotiationState::AnswerSent => {
                return Err(SessionError::NegotiationInProgress);
            }
            NegotiationState::Stable => {
                return Err(SessionError::InvalidState("already negotiated".to_string()));
            }
            NegotiationState::Closed => {
                return Err(SessionError::InvalidState("negotiation closed".to_string()));
            }
        }
        self.send_offer(false).await?;
        self.initiator = true;
        info!("Offer sent");
        Ok(())
    }

    /// Fresh offer gathering new candidates; media stays attached
    pub async fn restart_connectivity(&mut self) -> Result<(), SessionError> {
        match self.state {
            NegotiationState::Stable | NegotiationState::AnswerSent => {}
            NegotiationState::OfferPending => return Err(SessionError::NegotiationInProgress),
            NegotiationState::Idle => {
                return Err(SessionError::InvalidState("nothing negotiated to restart".to_string()));
            }
            NegotiationState::Closed => {
                return Err(SessionError::InvalidState("negotiation closed".to_string()));
            }
        }
        self.send_offer(true).await?;
        info!("ICE restart offer sent");
        Ok(())
    }

    async fn send_offer(&mut self, ice_restart: bool) -> Result<(), SessionError> {
        let to = self
            .partner
            .clone()
            .ok_or_else(|| SessionError::InvalidState("no partner to offer to".to_string()))?;

        let offer = self.connection.create_offer(ice_restart).await?;
        self.connection.set_local_description(offer.clone()).await?;

        let previous = self.state;
        self.state = NegotiationState::OfferPending;
        if let Err(e) = self.signaling.send(OutboundMessage::Offer { sdp: offer, to }).await {
            self.state = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Apply a remote offer and answer it
    pub async fn accept_offer(&mut self, description: SessionDescription, from: PeerId) -> Result<(), SessionError> {
        match self.state {
            NegotiationState::Closed => {
                return Err(SessionError::InvalidState("negotiation closed".to_string()));
            }
            // The relay designates a single initiator, so an offer crossing
            // ours means the partner broke the protocol.
            NegotiationState::OfferPending => return Err(SessionError::NegotiationInProgress),
            _ => {}
        }

        if self.partner.is_none() {
            self.set_partner(from.clone()).await;
        }
        if self.state == NegotiationState::Idle {
            self.initiator = false;
        }

        self.connection.set_remote_description(description).await?;
        self.has_remote_description = true;
        self.flush_remote_candidates().await;

        let answer = self.connection.create_answer().await?;
        self.connection.set_local_description(answer.clone()).await?;
        self.signaling.send(OutboundMessage::Answer { sdp: answer, to: from }).await?;
        self.state = NegotiationState::AnswerSent;
        Ok(())
    }

    /// Apply the answer to our outstanding offer
    pub async fn accept_answer(&mut self, description: SessionDescription) -> Result<(), SessionError> {
        if self.state != NegotiationState::OfferPending {
            return Err(SessionError::UnexpectedAnswer);
        }
        self.connection.set_remote_description(description).await?;
        self.has_remote_description = true;
        self.state = NegotiationState::Stable;
        self.flush_remote_candidates().await;
        Ok(())
    }

    /// Apply a remote candidate, or hold it until a remote description lands
    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), SessionError> {
        if self.state == NegotiationState::Closed {
            debug!("Dropping remote candidate after teardown");
            return Ok(());
        }
        if !self.has_remote_description {
            debug!("Buffering remote candidate until remote description is set");
            self.pending_remote.push(candidate);
            return Ok(());
        }
        self.connection.add_ice_candidate(candidate).await
    }

    async fn flush_remote_candidates(&mut self) {
        if self.pending_remote.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_remote);
        debug!("Applying {} buffered remote candidates", pending.len());
        for candidate in pending {
            if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                warn!("ICE add error {}", e);
            }
        }
    }

    /// Forward a discovered local candidate, or hold it until the partner is known
    pub async fn on_local_candidate(&mut self, candidate: IceCandidate) {
        if self.state == NegotiationState::Closed {
            return;
        }
        match self.partner.clone() {
            Some(to) => self.send_candidate(candidate, to).await,
            None => self.pending_local.push(candidate),
        }
    }

    async fn flush_local_candidates(&mut self) {
        let Some(to) = self.partner.clone() else {
            return;
        };
        for candidate in std::mem::take(&mut self.pending_local) {
            self.send_candidate(candidate, to.clone()).await;
        }
    }

    async fn send_candidate(&self, candidate: IceCandidate, to: PeerId) {
        if let Err(e) = self.signaling.send(OutboundMessage::IceCandidate { candidate, to }).await {
            warn!("Failed to forward local candidate: {}", e);
        }
    }

    /// Connectivity reached `connected`; an answered round is now complete
    pub fn mark_connected(&mut self) {
        if self.state == NegotiationState::AnswerSent {
            self.state = NegotiationState::Stable;
        }
    }

    /// Swap the sender's track. Never produces a signaling message.
    pub async fn replace_outbound_track(&self, kind: TrackKind, track: &MediaTrack) -> Result<(), SessionError> {
        if self.state == NegotiationState::Closed {
            return Err(SessionError::InvalidState("negotiation closed".to_string()));
        }
        self.connection.replace_track(kind, track).await?;
        debug!("Replaced outbound {} track with {} ({:?})", kind, track.id(), track.source());
        Ok(())
    }

    /// Detach observers, drop buffers, stop senders and close. Repeatable.
    pub async fn teardown(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.connection.set_observer(None);
        self.state = NegotiationState::Closed;
        self.pending_local.clear();
        self.pending_remote.clear();
        self.connection.stop_senders().await;
        if let Err(e) = self.connection.close().await {
            warn!("Error closing peer connection: {}", e);
        }
        debug!("Negotiation engine {} torn down", self.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackSource;
    use crate::testing::{MockConnection, RecordingSignaling};

    struct Fixture {
        engine: NegotiationEngine,
        connection: MockConnection,
        signaling: Arc<RecordingSignaling>,
        events: mpsc::UnboundedReceiver<EngineEvent>,
    }

    async fn fixture() -> Fixture {
        let connection = MockConnection::new();
        let signaling = Arc::new(RecordingSignaling::default());
        let (tx, events) = mpsc::unbounded_channel();
        let local = LocalMedia {
            audio: Some(MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, None, "mic")),
            video: Some(MediaTrack::new(TrackKind::Video, TrackSource::Camera, Some("cam".into()), "cam")),
        };
        let engine = NegotiationEngine::new(1, Box::new(connection.clone()), signaling.clone(), &local, tx)
            .await
            .unwrap();
        Fixture { engine, connection, signaling, events }
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{} 1 udp 2122260223 10.0.0.{} 5000 typ host", n, n))
    }

    #[tokio::test]
    async fn construction_registers_observer_and_tracks() {
        let mut f = fixture().await;
        assert!(f.connection.observer_attached());
        assert!(f.connection.sender(TrackKind::Audio).is_some());
        assert!(f.connection.sender(TrackKind::Video).is_some());
        assert!(f.connection.emit(crate::rtc::ConnectionEvent::LocalCandidate(candidate(1))));
        assert_eq!(f.events.try_recv().unwrap().epoch, 1);
    }

    #[tokio::test]
    async fn second_offer_is_rejected_while_pending() {
        let mut f = fixture().await;
        f.engine.set_partner(PeerId::new("B")).await;
        f.engine.originate_offer().await.unwrap();
        assert_eq!(f.engine.state(), NegotiationState::OfferPending);
        assert!(f.engine.is_initiator());

        let err = f.engine.originate_offer().await.unwrap_err();
        assert_eq!(err, SessionError::NegotiationInProgress);
        assert_eq!(f.signaling.offers().len(), 1);
    }

    #[tokio::test]
    async fn offer_without_partner_is_invalid() {
        let mut f = fixture().await;
        let err = f.engine.originate_offer().await.unwrap_err();
        assert_eq!(err.kind(), "invalid-state");
        assert_eq!(f.engine.state(), NegotiationState::Idle);
        assert!(f.signaling.sent().is_empty());
    }

    #[tokio::test]
    async fn answer_completes_offer_round() {
        let mut f = fixture().await;
        f.engine.set_partner(PeerId::new("B")).await;
        f.engine.originate_offer().await.unwrap();
        f.engine.accept_answer(SessionDescription::answer("v=0 answer")).await.unwrap();
        assert_eq!(f.engine.state(), NegotiationState::Stable);
        assert_eq!(f.connection.remote_description().unwrap().sdp, "v=0 answer");
    }

    #[tokio::test]
    async fn answer_without_offer_is_unexpected() {
        let mut f = fixture().await;
        let err = f.engine.accept_answer(SessionDescription::answer("v=0")).await.unwrap_err();
        assert_eq!(err, SessionError::UnexpectedAnswer);
        assert!(f.connection.remote_description().is_none());
    }

    #[tokio::test]
    async fn offer_is_answered_to_sender() {
        let mut f = fixture().await;
        f.engine.accept_offer(SessionDescription::offer("v=0 offer"), PeerId::new("A")).await.unwrap();
        assert_eq!(f.engine.state(), NegotiationState::AnswerSent);
        assert_eq!(f.engine.partner(), Some(&PeerId::new("A")));
        assert!(!f.engine.is_initiator());

        let sent = f.signaling.sent();
        match sent.last() {
            Some(OutboundMessage::Answer { to, sdp }) => {
                assert_eq!(to.as_str(), "A");
                assert_eq!(sdp.sdp_type, crate::rtc::signaling::SdpType::Answer);
            }
            other => panic!("Expected answer, got {:?}", other),
        }

        f.engine.mark_connected();
        assert_eq!(f.engine.state(), NegotiationState::Stable);
    }

    #[tokio::test]
    async fn early_candidates_apply_in_arrival_order() {
        let mut f = fixture().await;
        for n in 1..=3 {
            f.engine.add_remote_candidate(candidate(n)).await.unwrap();
        }
        assert_eq!(f.engine.pending_remote_candidates(), 3);
        assert!(f.connection.applied_candidates().is_empty());

        f.engine.accept_offer(SessionDescription::offer("v=0"), PeerId::new("A")).await.unwrap();
        assert_eq!(f.engine.pending_remote_candidates(), 0);
        assert_eq!(f.connection.applied_candidates(), vec![candidate(1), candidate(2), candidate(3)]);

        f.engine.add_remote_candidate(candidate(4)).await.unwrap();
        assert_eq!(f.connection.applied_candidates().len(), 4);
    }

    #[tokio::test]
    async fn rejected_candidate_does_not_stop_flush() {
        let mut f = fixture().await;
        f.engine.add_remote_candidate(candidate(1)).await.unwrap();
        f.engine.add_remote_candidate(IceCandidate::new("malformed")).await.unwrap();
        f.engine.add_remote_candidate(candidate(2)).await.unwrap();
        f.engine.accept_offer(SessionDescription::offer("v=0"), PeerId::new("A")).await.unwrap();
        assert_eq!(f.connection.applied_candidates(), vec![candidate(1), candidate(2)]);

        let err = f.engine.add_remote_candidate(IceCandidate::new("malformed")).await.unwrap_err();
        assert_eq!(err.kind(), "candidate-rejected");
        assert_eq!(f.engine.state(), NegotiationState::AnswerSent);
    }

    #[tokio::test]
    async fn local_candidates_wait_for_partner() {
        let mut f = fixture().await;
        f.engine.on_local_candidate(candidate(1)).await;
        f.engine.on_local_candidate(candidate(2)).await;
        assert!(f.signaling.sent().is_empty());
        assert_eq!(f.engine.pending_local_candidates(), 2);

        f.engine.set_partner(PeerId::new("B")).await;
        let forwarded: Vec<IceCandidate> = f
            .signaling
            .sent()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::IceCandidate { candidate, to } if to.as_str() == "B" => Some(candidate),
                _ => None,
            })
            .collect();
        assert_eq!(forwarded, vec![candidate(1), candidate(2)]);

        f.engine.on_local_candidate(candidate(3)).await;
        assert_eq!(f.signaling.sent().len(), 3);
    }

    #[tokio::test]
    async fn restart_only_from_completed_round() {
        let mut f = fixture().await;
        assert!(f.engine.restart_connectivity().await.is_err());

        f.engine.set_partner(PeerId::new("B")).await;
        f.engine.originate_offer().await.unwrap();
        assert_eq!(f.engine.restart_connectivity().await.unwrap_err(), SessionError::NegotiationInProgress);

        f.engine.accept_answer(SessionDescription::answer("v=0")).await.unwrap();
        f.engine.restart_connectivity().await.unwrap();
        assert_eq!(f.engine.state(), NegotiationState::OfferPending);
        assert_eq!(f.connection.ice_restarts(), 1);
        assert_eq!(f.signaling.offers().len(), 2);
    }

    #[tokio::test]
    async fn replacing_a_track_sends_nothing() {
        let f = fixture().await;
        let screen = MediaTrack::new(TrackKind::Video, TrackSource::Screen, None, "screen");
        f.engine.replace_outbound_track(TrackKind::Video, &screen).await.unwrap();
        assert!(f.connection.sender(TrackKind::Video).unwrap().same_track(&screen));
        assert!(f.signaling.sent().is_empty());
    }

    #[tokio::test]
    async fn teardown_detaches_before_close_and_repeats_safely() {
        let mut f = fixture().await;
        f.engine.teardown().await;
        f.engine.teardown().await;
        assert_eq!(f.engine.state(), NegotiationState::Closed);
        assert!(!f.connection.observer_attached());
        assert!(f.connection.is_closed());
        assert_eq!(f.connection.close_count(), 1);
        assert!(!f.connection.emit(crate::rtc::ConnectionEvent::LocalCandidate(candidate(1))));

        let calls = f.connection.calls();
        let detach = calls.iter().position(|c| c == "set_observer(None)").unwrap();
        let close = calls.iter().position(|c| c == "close").unwrap();
        assert!(detach < close);

        f.engine.on_local_candidate(candidate(2)).await;
        f.engine.add_remote_candidate(candidate(3)).await.unwrap();
        assert!(f.signaling.sent().is_empty());
        assert!(f.connection.applied_candidates().is_empty());
    }

    #[tokio::test]
    async fn rebind_holds_candidates_for_new_partner() {
        let mut f = fixture().await;
        f.engine.set_partner(PeerId::new("B")).await;
        f.engine.originate_offer().await.unwrap();
        f.engine.accept_answer(SessionDescription::answer("v=0 b")).await.unwrap();
        f.engine.add_remote_candidate(candidate(1)).await.unwrap();
        assert_eq!(f.connection.applied_candidates(), vec![candidate(1)]);

        f.engine.rebind_partner(PeerId::new("C")).await;
        assert_eq!(f.engine.state(), NegotiationState::Stable);
        f.engine.add_remote_candidate(candidate(2)).await.unwrap();
        assert_eq!(f.engine.pending_remote_candidates(), 1);
        assert_eq!(f.connection.applied_candidates(), vec![candidate(1)]);

        f.engine.accept_offer(SessionDescription::offer("v=0 c"), PeerId::new("C")).await.unwrap();
        assert_eq!(f.connection.applied_candidates(), vec![candidate(1), candidate(2)]);
        assert_eq!(f.engine.partner(), Some(&PeerId::new("C")));
    }

    #[tokio::test]
    async fn rebind_abandons_unanswered_offer() {
        let mut f = fixture().await;
        f.engine.set_partner(PeerId::new("B")).await;
        f.engine.originate_offer().await.unwrap();
        f.engine.rebind_partner(PeerId::new("C")).await;
        assert_eq!(f.engine.state(), NegotiationState::Idle);
        f.engine.originate_offer().await.unwrap();
        match f.signaling.offers().last() {
            Some(OutboundMessage::Offer { to, .. }) => assert_eq!(to.as_str(), "C"),
            other => panic!("Expected offer, got {:?}", other),
        }
    }
}
