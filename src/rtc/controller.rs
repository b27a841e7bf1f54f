//! Session Controller
//!
//! Top-level call state machine. A single task owns the controller and
//! feeds it commands, relay events, connection events and internal events
//! one at a time, so transition logic never runs concurrently with itself.

use super::negotiation::{NegotiationEngine, NegotiationState};
use super::peer_connection::{ConnectionEvent, ConnectionFactory, ConnectivityState, EngineEvent};
use super::session::{ConnectionState, Session, SessionNotification};
use super::signaling::{AdvisorySignal, IceCandidate, OutboundMessage, PeerId, RelayEvent, SessionDescription, SignalingChannel};
use super::SessionError;
use crate::ice::IceConfigSource;
use crate::media::{next_device_index, MediaCapture, MediaConstraints, MediaError, MediaTrack, TrackKind};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Picture-in-picture presentation, owned by the UI
#[async_trait]
pub trait PictureInPicture: Send + Sync {
    async fn request(&self) -> Result<(), SessionError>;
    async fn exit(&self) -> Result<(), SessionError>;
}

/// Events the controller schedules for itself
#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    /// The screen capture source stopped on its own
    ScreenShareEnded { epoch: u64, track_id: String },
}

/// Receiving side of the controller's connection and internal events
pub struct EventInbox {
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
}

pub type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// UI commands
#[derive(Debug)]
pub enum Command {
    Join { room_id: String, reply: Reply<()> },
    Leave { reply: Reply<()> },
    ToggleTrack { kind: TrackKind, reply: Reply<bool> },
    SwitchVideoDevice { reply: Reply<String> },
    ShareScreen { reply: Reply<()> },
    StopShare { reply: Reply<()> },
    PictureInPicture { enter: bool, reply: Reply<()> },
    State { reply: Reply<ConnectionState> },
}

struct CallStatus {
    state: ConnectionState,
    notifications: broadcast::Sender<SessionNotification>,
}

impl CallStatus {
    fn set(&mut self, to: ConnectionState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        info!("Call state: {} -> {}", from, to);
        self.state = to;
        self.notify(SessionNotification::StateChanged { from, to });
    }

    fn notify(&self, notification: SessionNotification) {
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }
}

pub struct SessionController {
    constraints: MediaConstraints,
    ice_source: Arc<dyn IceConfigSource>,
    capture: Arc<dyn MediaCapture>,
    factory: Arc<dyn ConnectionFactory>,
    signaling: Arc<dyn SignalingChannel>,
    pip: Option<Arc<dyn PictureInPicture>>,
    status: CallStatus,
    session: Option<Session>,
    next_epoch: u64,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
}

impl SessionController {
    pub fn new(
        constraints: MediaConstraints,
        ice_source: Arc<dyn IceConfigSource>,
        capture: Arc<dyn MediaCapture>,
        factory: Arc<dyn ConnectionFactory>,
        signaling: Arc<dyn SignalingChannel>,
    ) -> (Self, EventInbox) {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(64);

        let controller = Self {
            constraints,
            ice_source,
            capture,
            factory,
            signaling,
            pip: None,
            status: CallStatus { state: ConnectionState::Idle, notifications },
            session: None,
            next_epoch: 0,
            engine_tx,
            internal_tx,
        };
        (controller, EventInbox { engine_rx, internal_rx })
    }

    pub fn with_picture_in_picture(mut self, pip: Arc<dyn PictureInPicture>) -> Self {
        self.pip = Some(pip);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.status.notifications.subscribe()
    }

    /// Start a session: ICE config, local media, connection, then the room.
    /// Each stage short-circuits; nothing joins the room if media fails.
    pub async fn join(&mut self, room_id: &str) -> Result<(), SessionError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(SessionError::InvalidRoom);
        }
        if !self.status.state.is_idle() || self.session.is_some() {
            return Err(SessionError::InvalidState(format!("cannot join while {}", self.status.state)));
        }

        let ice = self.ice_source.fetch().await?;

        // Device selection starts from the default for every session
        let constraints = MediaConstraints { preferred_device_id: None, ..self.constraints.clone() };
        let local = self.capture.acquire_local_media(&constraints).await?;
        info!(
            "Got media: audio {}, video {}",
            local.audio.is_some(),
            local.video.as_ref().map(MediaTrack::label).unwrap_or("none")
        );

        let connection = match self.factory.create(&ice).await {
            Ok(connection) => connection,
            Err(e) => {
                self.release_tracks(local.tracks());
                return Err(e);
            }
        };

        self.next_epoch += 1;
        let engine = match NegotiationEngine::new(
            self.next_epoch,
            connection,
            self.signaling.clone(),
            &local,
            self.engine_tx.clone(),
        )
        .await
        {
            Ok(engine) => engine,
            Err(e) => {
                self.release_tracks(local.tracks());
                return Err(e);
            }
        };

        let mut session = Session::new(room_id.to_string(), ice, local, engine);

        if let Err(e) = self.signaling.send(OutboundMessage::Join { room_id: room_id.to_string() }).await {
            session.engine.teardown().await;
            self.release_tracks(session.owned_tracks().iter());
            return Err(e);
        }

        info!("Joined room {}", room_id);
        self.session = Some(session);
        self.status.set(ConnectionState::Joining);
        Ok(())
    }

    /// End the session. Idempotent; a no-op when no session exists.
    pub async fn leave(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Err(e) = self.signaling.send(OutboundMessage::Leave).await {
            warn!("Failed to notify relay of leave: {}", e);
        }

        session.stop_screen_watch();
        session.engine.teardown().await;
        self.release_tracks(session.owned_tracks().iter());

        let room_id = std::mem::take(&mut session.room_id);
        let duration = session.started_at.elapsed();
        drop(session);

        self.status.set(ConnectionState::Closed);
        info!("Left room {} after {:.1}s & cleaned up", room_id, duration.as_secs_f64());
    }

    /// Surface an error; terminal ones move the call to `failed` first
    fn fail(&mut self, err: SessionError) {
        if err.is_terminal() {
            self.status.set(ConnectionState::Failed);
        }
        self.status.notify(SessionNotification::error(&err));
    }

    fn release_tracks<'a>(&self, tracks: impl Iterator<Item = &'a MediaTrack>) {
        for track in tracks {
            self.capture.release(track);
        }
    }

    /// Flip a local track's enabled flag and tell the partner
    pub async fn toggle_track(&mut self, kind: TrackKind) -> Result<bool, SessionError> {
        if !matches!(self.status.state, ConnectionState::Connected | ConnectionState::Negotiating) {
            return Err(SessionError::InvalidState(format!("cannot toggle {} while {}", kind, self.status.state)));
        }
        let session = self.session.as_ref().ok_or_else(|| SessionError::InvalidState("no session".to_string()))?;
        let track = session.local.track(kind).ok_or(SessionError::TrackUnavailable(kind))?;

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        info!("Local {} {}", kind, if enabled { "enabled" } else { "muted" });

        let signal = match kind {
            TrackKind::Audio => AdvisorySignal::Mic { enabled },
            TrackKind::Video => AdvisorySignal::Cam { enabled },
        };
        self.send_advisory(signal).await;
        self.status.notify(SessionNotification::TrackToggled { kind, enabled });
        Ok(enabled)
    }

    /// Move to the next camera. Returns the device now in use.
    pub async fn switch_video_device(&mut self) -> Result<String, SessionError> {
        self.require_live("switch camera")?;
        let capture = self.capture.clone();
        let session = self.session.as_mut().ok_or_else(|| SessionError::InvalidState("no session".to_string()))?;
        let current = session.local.video.clone().ok_or(SessionError::TrackUnavailable(TrackKind::Video))?;

        let devices = capture.enumerate_video_inputs().await?;
        if let [only] = devices.as_slice() {
            debug!("Only one camera available; keeping {}", only.device_id);
            return Ok(only.device_id.clone());
        }
        let current_id = current.device_id().map(str::to_string).or_else(|| session.device_selection.clone());
        let next = next_device_index(&devices, current_id.as_deref())
            .map(|idx| devices[idx].clone())
            .ok_or_else(|| SessionError::MediaAcquisition(MediaError::NoMatchingDevice("No camera devices".to_string())))?;

        let constraints = MediaConstraints {
            want_audio: false,
            want_video: true,
            preferred_device_id: Some(next.device_id.clone()),
            ..self.constraints.clone()
        };
        let media = capture.acquire_local_media(&constraints).await?;
        if let Some(ref audio) = media.audio {
            capture.release(audio);
        }
        let camera = media.video.ok_or_else(|| {
            SessionError::MediaAcquisition(MediaError::NoMatchingDevice(next.device_id.clone()))
        })?;
        camera.set_enabled(current.is_enabled());

        // While sharing, the screen owns the sender; the camera is restored later
        if !session.is_sharing_screen() {
            if let Err(e) = session.engine.replace_outbound_track(TrackKind::Video, &camera).await {
                capture.release(&camera);
                return Err(e);
            }
        }

        capture.release(&current);
        session.local.video = Some(camera);
        session.device_selection = Some(next.device_id.clone());

        info!("Switched camera to {} ({})", next.label, next.device_id);
        self.status.notify(SessionNotification::DeviceSwitched { device_id: next.device_id.clone() });
        Ok(next.device_id)
    }

    /// Send the screen instead of the camera
    pub async fn share_screen(&mut self) -> Result<(), SessionError> {
        self.require_live("share screen")?;
        let capture = self.capture.clone();
        let internal_tx = self.internal_tx.clone();
        let session = self.session.as_mut().ok_or_else(|| SessionError::InvalidState("no session".to_string()))?;

        if session.is_sharing_screen() {
            debug!("Screen share already active");
            return Ok(());
        }
        if session.local.video.is_none() {
            return Err(SessionError::UnsupportedCapability("screen share needs a video sender".to_string()));
        }

        let screen = capture.acquire_screen_capture().await.map_err(|e| {
            warn!("Share screen error: {}", e);
            SessionError::from(e)
        })?;

        if let Err(e) = session.engine.replace_outbound_track(TrackKind::Video, &screen).await {
            capture.release(&screen);
            return Err(e);
        }

        let epoch = session.engine.epoch();
        let watched = screen.clone();
        session.set_screen_watch(tokio::spawn(async move {
            watched.ended().await;
            let _ = internal_tx.send(InternalEvent::ScreenShareEnded { epoch, track_id: watched.id().to_string() });
        }));
        session.screen_track = Some(screen);

        info!("Screen share started");
        self.send_advisory(AdvisorySignal::Screenshare { active: true }).await;
        self.status.notify(SessionNotification::ScreenShareChanged { active: true });
        Ok(())
    }

    /// Return to the camera. No-op when not sharing.
    pub async fn stop_share(&mut self) -> Result<(), SessionError> {
        self.restore_camera().await;
        Ok(())
    }

    async fn restore_camera(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(screen) = session.screen_track.take() else {
            return;
        };
        session.stop_screen_watch();

        if let Some(camera) = session.local.video.clone() {
            if let Err(e) = session.engine.replace_outbound_track(TrackKind::Video, &camera).await {
                warn!("Failed to restore camera track: {}", e);
            }
        }
        self.capture.release(&screen);

        info!("Screen share stopped");
        self.send_advisory(AdvisorySignal::Screenshare { active: false }).await;
        self.status.notify(SessionNotification::ScreenShareChanged { active: false });
    }

    pub async fn picture_in_picture(&mut self, enter: bool) -> Result<(), SessionError> {
        let pip = self
            .pip
            .clone()
            .ok_or_else(|| SessionError::UnsupportedCapability("picture-in-picture".to_string()))?;
        if enter {
            pip.request().await
        } else {
            pip.exit().await
        }
    }

    fn require_live(&self, action: &str) -> Result<(), SessionError> {
        if self.status.state.is_live() && self.session.is_some() {
            Ok(())
        } else {
            Err(SessionError::InvalidState(format!("cannot {} while {}", action, self.status.state)))
        }
    }

    async fn send_advisory(&self, signal: AdvisorySignal) {
        if let Err(e) = self.signaling.send(OutboundMessage::Signal(signal)).await {
            debug!("Advisory signal not delivered: {}", e);
        }
    }

    /// Apply one relay event
    pub async fn handle_relay_event(&mut self, event: RelayEvent) {
        if event == RelayEvent::Disconnected {
            warn!("Signaling relay disconnected");
            self.status
                .notify(SessionNotification::error(&SessionError::Signaling("relay disconnected".to_string())));
            return;
        }
        if self.session.is_none() || self.status.state == ConnectionState::Failed {
            debug!("Dropping relay event outside an active session: {:?}", event);
            return;
        }

        match event {
            RelayEvent::RoomFull => self.on_room_full().await,
            RelayEvent::PeerJoined { id } => {
                info!("Peer joined: {}", id);
                self.on_room_trigger(Some(id)).await;
            }
            RelayEvent::Ready => {
                info!("Room ready");
                self.on_room_trigger(None).await;
            }
            RelayEvent::Offer { sdp, from } => self.on_offer(sdp, from).await,
            RelayEvent::Answer { sdp, from } => self.on_answer(sdp, from).await,
            RelayEvent::IceCandidate { candidate } => self.on_remote_candidate(candidate).await,
            RelayEvent::Signal(payload) => {
                info!("Signal: {}", payload);
                self.status.notify(SessionNotification::PartnerSignal(payload));
            }
            RelayEvent::Disconnected => {}
        }
    }

    async fn on_room_full(&mut self) {
        warn!("Room already has 2 people");
        self.fail(SessionError::RoomFull);
        self.leave().await;
    }

    /// `peer-joined` / `ready`: the relay designates this side as offerer
    async fn on_room_trigger(&mut self, id: Option<PeerId>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut partner_changed = false;
        if let Some(id) = id {
            match session.partner_id.clone() {
                None => {
                    session.partner_id = Some(id.clone());
                    session.engine.set_partner(id).await;
                }
                Some(current) if current == id => {}
                Some(current) => {
                    warn!("Partner changed from {} to {}", current, id);
                    session.partner_id = Some(id.clone());
                    session.engine.rebind_partner(id).await;
                    partner_changed = true;
                }
            }
        }

        if session.partner_id.is_none() {
            debug!("Room ready but partner unknown; waiting for peer-joined or offer");
            return;
        }
        if self.status.state != ConnectionState::Joining && !partner_changed {
            debug!("Ignoring redundant negotiation trigger while {}", self.status.state);
            return;
        }

        self.status.set(ConnectionState::Negotiating);
        info!("Starting negotiation...");
        let result = match session.engine.state() {
            NegotiationState::Stable | NegotiationState::AnswerSent => session.engine.restart_connectivity().await,
            _ => session.engine.originate_offer().await,
        };
        match result {
            Ok(()) => {}
            Err(SessionError::NegotiationInProgress) => debug!("Offer already outstanding; trigger ignored"),
            Err(e) => {
                warn!("Negotiation error: {}", e);
                self.status.notify(SessionNotification::error(&e));
            }
        }
    }

    async fn on_offer(&mut self, sdp: SessionDescription, from: PeerId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.partner_id.clone() {
            None => {
                session.partner_id = Some(from.clone());
                session.engine.set_partner(from.clone()).await;
            }
            Some(current) if current != from => {
                warn!("Offer from {} replaces partner {}", from, current);
                session.partner_id = Some(from.clone());
                session.engine.rebind_partner(from.clone()).await;
            }
            Some(_) => {}
        }

        if self.status.state == ConnectionState::Joining {
            self.status.set(ConnectionState::Negotiating);
        }

        match session.engine.accept_offer(sdp, from).await {
            Ok(()) => info!("Received offer -> sent answer"),
            Err(SessionError::NegotiationInProgress) => warn!("Offer crossed our own; ignored"),
            Err(e) => {
                warn!("Failed to answer offer: {}", e);
                self.status.notify(SessionNotification::error(&e));
            }
        }
    }

    async fn on_answer(&mut self, sdp: SessionDescription, from: Option<PeerId>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let (Some(from), Some(partner)) = (from.as_ref(), session.partner_id.as_ref()) {
            if from != partner {
                warn!("Dropping answer from {} (partner is {})", from, partner);
                return;
            }
        }

        match session.engine.accept_answer(sdp).await {
            Ok(()) => {
                info!("Received answer");
                if session.pending_renegotiation {
                    session.pending_renegotiation = false;
                    if let Err(e) = session.engine.restart_connectivity().await {
                        warn!("Deferred ICE restart failed: {}", e);
                    }
                }
            }
            Err(SessionError::UnexpectedAnswer) => warn!("Ignoring answer with no offer outstanding"),
            Err(e) => {
                warn!("Failed to apply answer: {}", e);
                self.status.notify(SessionNotification::error(&e));
            }
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(e) = session.engine.add_remote_candidate(candidate).await {
            warn!("ICE add error {}", e);
        }
    }

    /// Apply one connection event; events from a torn-down engine are dropped
    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!("Dropping connection event with no session");
            return;
        };
        if event.epoch != session.engine.epoch() {
            debug!("Dropping stale connection event from engine {}", event.epoch);
            return;
        }

        match event.event {
            ConnectionEvent::LocalCandidate(candidate) => session.engine.on_local_candidate(candidate).await,
            ConnectionEvent::RemoteTrack(track) => {
                info!("Remote {} track {} arrived", track.kind, track.id);
                session.remote_tracks.push(track.clone());
                self.status.notify(SessionNotification::RemoteTrackAdded(track));
            }
            ConnectionEvent::StateChanged(connectivity) => self.on_connectivity(connectivity).await,
        }
    }

    /// Bounded retry: one ICE restart per outage, then `failed`
    async fn on_connectivity(&mut self, connectivity: ConnectivityState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        info!("PC state: {:?}", connectivity);

        if self.status.state == ConnectionState::Failed {
            return;
        }

        if connectivity == ConnectivityState::Connected {
            session.restart_attempted = false;
            session.engine.mark_connected();
            self.status.set(ConnectionState::Connected);
            return;
        }
        if !connectivity.is_failure() {
            return;
        }

        // Backends report changes only, so a repeat means a second outage
        if session.restart_attempted {
            error!("Connectivity {:?} after ICE restart", connectivity);
            self.fail(SessionError::ConnectivityFailed);
            return;
        }

        session.restart_attempted = true;
        self.status.set(ConnectionState::Reconnecting);

        // Only the designated offerer restarts, so both sides never offer at once
        if session.engine.state() == NegotiationState::AnswerSent
            || (session.engine.state() == NegotiationState::Stable && !session.engine.is_initiator())
        {
            info!("Waiting for partner to restart ICE");
            return;
        }

        match session.engine.restart_connectivity().await {
            Ok(()) => {}
            Err(SessionError::NegotiationInProgress) => {
                debug!("Offer outstanding; ICE restart deferred until answer");
                session.pending_renegotiation = true;
            }
            Err(e) => {
                error!("ICE restart failed: {}", e);
                self.fail(SessionError::ConnectivityFailed);
            }
        }
    }

    pub async fn handle_internal_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::ScreenShareEnded { epoch, track_id } => {
                let current = self.session.as_ref().is_some_and(|s| {
                    s.engine.epoch() == epoch && s.screen_track.as_ref().is_some_and(|t| t.id() == track_id)
                });
                if current {
                    info!("Screen capture ended by source");
                    self.restore_camera().await;
                }
            }
        }
    }

    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Join { room_id, reply } => {
                let result = self.join(&room_id).await;
                self.reply(reply, result);
            }
            Command::Leave { reply } => {
                self.leave().await;
                self.reply(reply, Ok(()));
            }
            Command::ToggleTrack { kind, reply } => {
                let result = self.toggle_track(kind).await;
                self.reply(reply, result);
            }
            Command::SwitchVideoDevice { reply } => {
                let result = self.switch_video_device().await;
                self.reply(reply, result);
            }
            Command::ShareScreen { reply } => {
                let result = self.share_screen().await;
                self.reply(reply, result);
            }
            Command::StopShare { reply } => {
                let result = self.stop_share().await;
                self.reply(reply, result);
            }
            Command::PictureInPicture { enter, reply } => {
                let result = self.picture_in_picture(enter).await;
                if let Err(ref e) = result {
                    warn!("PiP error: {}", e);
                }
                self.reply(reply, result);
            }
            Command::State { reply } => {
                let _ = reply.send(Ok(self.status.state));
            }
        }
    }

    fn reply<T>(&self, reply: Reply<T>, result: Result<T, SessionError>) {
        if let Err(ref e) = result {
            self.status.notify(SessionNotification::error(e));
        }
        let _ = reply.send(result);
    }

    /// Handle everything already queued in the inbox without waiting
    pub async fn process_pending(&mut self, inbox: &mut EventInbox) {
        loop {
            if let Ok(event) = inbox.engine_rx.try_recv() {
                self.handle_engine_event(event).await;
                continue;
            }
            if let Ok(event) = inbox.internal_rx.try_recv() {
                self.handle_internal_event(event).await;
                continue;
            }
            break;
        }
    }

    /// Drive the controller until every handle is dropped, then leave
    pub async fn run(
        mut self,
        mut inbox: EventInbox,
        mut commands: mpsc::Receiver<Command>,
        mut relay: mpsc::UnboundedReceiver<RelayEvent>,
    ) {
        let mut relay_open = true;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = relay.recv(), if relay_open => match event {
                    Some(event) => self.handle_relay_event(event).await,
                    None => relay_open = false,
                },
                Some(event) = inbox.engine_rx.recv() => self.handle_engine_event(event).await,
                Some(event) = inbox.internal_rx.recv() => self.handle_internal_event(event).await,
            }
        }
        self.leave().await;
        debug!("Session controller stopped");
    }

    /// Move the controller onto its own task
    pub fn spawn(self, inbox: EventInbox, relay: mpsc::UnboundedReceiver<RelayEvent>) -> (SessionHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(32);
        let handle = SessionHandle { commands, notifications: self.status.notifications.clone() };
        let task = tokio::spawn(self.run(inbox, rx, relay));
        (handle, task)
    }
}

/// Command surface for the UI. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    notifications: broadcast::Sender<SessionNotification>,
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(build(tx)).await.map_err(|_| SessionError::ControllerGone)?;
        rx.await.map_err(|_| SessionError::ControllerGone)?
    }

    pub async fn join(&self, room_id: impl Into<String>) -> Result<(), SessionError> {
        let room_id = room_id.into();
        self.request(|reply| Command::Join { room_id, reply }).await
    }

    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Leave { reply }).await
    }

    pub async fn toggle_track(&self, kind: TrackKind) -> Result<bool, SessionError> {
        self.request(|reply| Command::ToggleTrack { kind, reply }).await
    }

    pub async fn switch_video_device(&self) -> Result<String, SessionError> {
        self.request(|reply| Command::SwitchVideoDevice { reply }).await
    }

    pub async fn share_screen(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::ShareScreen { reply }).await
    }

    pub async fn stop_share(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::StopShare { reply }).await
    }

    pub async fn request_picture_in_picture(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::PictureInPicture { enter: true, reply }).await
    }

    pub async fn exit_picture_in_picture(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::PictureInPicture { enter: false, reply }).await
    }

    pub async fn state(&self) -> Result<ConnectionState, SessionError> {
        self.request(|reply| Command::State { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifications.subscribe()
    }
}
