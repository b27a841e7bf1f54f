//! peercall - Main entry point
//!
//! Joins a room from the command line and stays in the call until Ctrl+C.

use clap::Parser;
use log::{error, info, warn};
use peercall::args::Args;
use peercall::rtc::rtc_backend::RtcConnectionFactory;
use peercall::{
    DummyCapture, HttpIceConfigSource, IceConfigSource, SessionController, SessionNotification,
    StaticIceConfigSource, WsSignalingChannel,
};
use std::env;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();
    let config = args.load_config();

    // Initialize logging with noise filtering for third-party WebRTC crates
    let log_level = match config {
        Ok(ref cfg) => cfg.logging.level.clone(),
        Err(_) if args.verbose => "debug".to_string(),
        Err(_) => "info".to_string(),
    };
    env_logger::Builder::new()
        .parse_filters(&env::var("PEERCALL_LOG").unwrap_or(log_level))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .init();

    info!("peercall v{}", env!("CARGO_PKG_VERSION"));

    let config = config.map_err(|e| {
        error!("Invalid configuration in {:?}: {}", args.config, e);
        e
    })?;

    let ice_source: Arc<dyn IceConfigSource> = if config.ice.fetch {
        let url = config.ice_url()?;
        info!("ICE servers from {}", url);
        Arc::new(HttpIceConfigSource::new(url, config.ice.fallback_servers.clone()))
    } else {
        Arc::new(StaticIceConfigSource::new(&config.ice.fallback_servers))
    };

    let (signaling, relay_events) = WsSignalingChannel::connect(&config.signaling.url).await?;
    let signaling = Arc::new(signaling);

    let (controller, inbox) = SessionController::new(
        config.media_constraints(),
        ice_source,
        Arc::new(DummyCapture::default()),
        Arc::new(RtcConnectionFactory),
        signaling.clone(),
    );
    let (handle, controller_task) = controller.spawn(inbox, relay_events);

    let mut notifications = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => report(&notification),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} session notifications", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    handle.join(args.room.clone()).await?;
    info!("Waiting in room {} (Ctrl+C to leave)", args.room);

    let _ = signal::ctrl_c().await;
    info!("Leaving...");

    if let Err(e) = handle.leave().await {
        warn!("Leave failed: {}", e);
    }
    drop(handle);
    let _ = controller_task.await;
    signaling.close();

    info!("peercall stopped");
    Ok(())
}

fn report(notification: &SessionNotification) {
    match notification {
        SessionNotification::StateChanged { from, to } => info!("Call {} -> {}", from, to),
        SessionNotification::TrackToggled { kind, enabled } => info!("Local {} enabled: {}", kind, enabled),
        SessionNotification::DeviceSwitched { device_id } => info!("Camera: {}", device_id),
        SessionNotification::ScreenShareChanged { active } => info!("Screen share active: {}", active),
        SessionNotification::RemoteTrackAdded(track) => info!("Partner {} track {}", track.kind, track.id),
        SessionNotification::PartnerSignal(payload) => info!("Partner signal: {}", payload),
        SessionNotification::Error { kind, message } => warn!("[{}] {}", kind, message),
    }
}
