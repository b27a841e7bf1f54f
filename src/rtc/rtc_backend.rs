//! webrtc-rs peer connections
//!
//! Implements `PeerConnection` over `RTCPeerConnection`. Engine callbacks are
//! registered once at creation and forward through a swappable observer slot,
//! so detaching the observer silences them before `close` runs.

use super::peer_connection::{ConnectionEvent, ConnectionFactory, ConnectivityState, EventSink, PeerConnection, RemoteTrack};
use super::signaling::{IceCandidate, SdpType, SessionDescription};
use super::SessionError;
use crate::ice::IceConfiguration;
use crate::media::{MediaTrack, TrackKind};
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

const STREAM_ID: &str = "peercall";

fn connection_error(context: &str, e: impl Display) -> SessionError {
    SessionError::Connection(format!("{}: {}", context, e))
}

/// Builds webrtc-rs connections with the default codec set
#[derive(Debug, Default)]
pub struct RtcConnectionFactory;

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(&self, ice: &IceConfiguration) -> Result<Box<dyn PeerConnection>, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| connection_error("Failed to register codecs", e))?;

        // Interceptors for RTCP feedback
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| connection_error("Failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = ice
            .ice_servers()
            .into_iter()
            .map(|server| RTCIceServer {
                urls: server.urls,
                username: server.username.unwrap_or_default(),
                credential: server.credential.unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        let peer_connection = api
            .new_peer_connection(RTCConfiguration { ice_servers, ..Default::default() })
            .await
            .map_err(|e| connection_error("Failed to create peer connection", e))?;

        Ok(Box::new(RtcPeerConnection::new(Arc::new(peer_connection))))
    }
}

type ObserverSlot = Arc<Mutex<Option<EventSink>>>;

fn dispatch(slot: &ObserverSlot, event: ConnectionEvent) {
    let sink = slot.lock().clone();
    if let Some(sink) = sink {
        sink.emit(event);
    }
}

fn connectivity_from(state: RTCPeerConnectionState) -> ConnectivityState {
    match state {
        RTCPeerConnectionState::Connecting => ConnectivityState::Connecting,
        RTCPeerConnectionState::Connected => ConnectivityState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectivityState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectivityState::Failed,
        RTCPeerConnectionState::Closed => ConnectivityState::Closed,
        _ => ConnectivityState::New,
    }
}

fn track_kind(kind: RTPCodecType) -> Option<TrackKind> {
    match kind {
        RTPCodecType::Audio => Some(TrackKind::Audio),
        RTPCodecType::Video => Some(TrackKind::Video),
        _ => None,
    }
}

/// Local sample track standing in for a captured `MediaTrack`
fn sample_track(track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
    let capability = match track.kind() {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_string(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: 90000,
            ..Default::default()
        },
    };
    Arc::new(TrackLocalStaticSample::new(capability, track.id().to_string(), STREAM_ID.to_string()))
}

pub struct RtcPeerConnection {
    peer_connection: Arc<RTCPeerConnection>,
    observer: ObserverSlot,
    senders: tokio::sync::Mutex<HashMap<TrackKind, Arc<RTCRtpSender>>>,
}

impl RtcPeerConnection {
    fn new(peer_connection: Arc<RTCPeerConnection>) -> Self {
        let observer: ObserverSlot = Arc::default();

        let slot = observer.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let slot = slot.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => dispatch(
                        &slot,
                        ConnectionEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                    ),
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let slot = observer.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let slot = slot.clone();
            Box::pin(async move {
                dispatch(&slot, ConnectionEvent::StateChanged(connectivity_from(state)));
            })
        }));

        let slot = observer.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let slot = slot.clone();
            Box::pin(async move {
                let Some(kind) = track_kind(track.kind()) else {
                    return;
                };
                dispatch(
                    &slot,
                    ConnectionEvent::RemoteTrack(RemoteTrack {
                        id: track.id(),
                        kind,
                        stream_id: track.stream_id(),
                    }),
                );
            })
        }));

        Self {
            peer_connection,
            observer,
            senders: tokio::sync::Mutex::new(HashMap::new()),
        }
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, SessionError> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(|e| connection_error("Invalid SDP", e))
}

fn from_rtc_description(description: &RTCSessionDescription, sdp_type: SdpType) -> SessionDescription {
    SessionDescription { sdp_type, sdp: description.sdp.clone() }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    fn set_observer(&self, sink: Option<EventSink>) {
        *self.observer.lock() = sink;
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        let local = sample_track(track);
        let sender = self
            .peer_connection
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| connection_error("Failed to add track", e))?;
        self.senders.lock().await.insert(track.kind(), sender);
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: &MediaTrack) -> Result<(), SessionError> {
        let senders = self.senders.lock().await;
        let sender = senders
            .get(&kind)
            .ok_or_else(|| SessionError::Connection(format!("no {} sender", kind)))?;
        sender
            .replace_track(Some(sample_track(track) as Arc<dyn TrackLocal + Send + Sync>))
            .await
            .map_err(|e| connection_error("Failed to replace track", e))
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, SessionError> {
        let options = RTCOfferOptions { ice_restart, ..Default::default() };
        let offer = self
            .peer_connection
            .create_offer(Some(options))
            .await
            .map_err(|e| connection_error("Failed to create offer", e))?;
        Ok(from_rtc_description(&offer, SdpType::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| connection_error("Failed to create answer", e))?;
        Ok(from_rtc_description(&answer, SdpType::Answer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.peer_connection
            .set_local_description(to_rtc_description(description)?)
            .await
            .map_err(|e| connection_error("Failed to set local description", e))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.peer_connection
            .set_remote_description(to_rtc_description(description)?)
            .await
            .map_err(|e| connection_error("Failed to set remote description", e))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| SessionError::CandidateRejected(e.to_string()))
    }

    async fn stop_senders(&self) {
        let senders: Vec<Arc<RTCRtpSender>> = self.senders.lock().await.drain().map(|(_, s)| s).collect();
        for sender in senders {
            if let Err(e) = self.peer_connection.remove_track(&sender).await {
                debug!("Failed to remove sender: {}", e);
            }
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| connection_error("Failed to close connection", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackSource;
    use tokio::sync::mpsc;

    #[test]
    fn engine_states_map_onto_connectivity() {
        assert_eq!(connectivity_from(RTCPeerConnectionState::Connected), ConnectivityState::Connected);
        assert_eq!(connectivity_from(RTCPeerConnectionState::Failed), ConnectivityState::Failed);
        assert_eq!(connectivity_from(RTCPeerConnectionState::Unspecified), ConnectivityState::New);
    }

    #[tokio::test]
    async fn offer_lists_local_tracks() {
        let connection = RtcConnectionFactory.create(&IceConfiguration::from_servers(&[])).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        connection.set_observer(Some(EventSink::new(1, tx)));

        let audio = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, None, "mic");
        let video = MediaTrack::new(TrackKind::Video, TrackSource::Camera, None, "cam");
        connection.add_track(&audio).await.unwrap();
        connection.add_track(&video).await.unwrap();

        let offer = connection.create_offer(false).await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=video"));

        let screen = MediaTrack::new(TrackKind::Video, TrackSource::Screen, None, "screen");
        connection.replace_track(TrackKind::Video, &screen).await.unwrap();

        connection.set_observer(None);
        connection.stop_senders().await;
        connection.close().await.unwrap();
    }
}
