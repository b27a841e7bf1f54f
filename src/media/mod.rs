//! Local media capture
//!
//! Defines the track handle shared between the capture backend, the
//! session controller and the peer connection, plus the capture trait
//! that backends implement.

pub mod dummy;

pub use dummy::DummyCapture;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Media kind carried by a track or sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a track's frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

/// Capture failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The user or platform refused access
    PermissionDenied(String),
    /// No device satisfies the constraints
    NoMatchingDevice(String),
    /// The capability does not exist on this platform
    NotSupported(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            MediaError::NoMatchingDevice(msg) => write!(f, "No matching device: {}", msg),
            MediaError::NotSupported(msg) => write!(f, "Not supported: {}", msg),
        }
    }
}

impl Error for MediaError {}

/// A video input as reported by device enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    pub device_id: String,
    pub label: String,
}

/// Capture constraints for `acquire_local_media`
#[derive(Debug, Clone, PartialEq)]
pub struct MediaConstraints {
    pub want_audio: bool,
    pub want_video: bool,
    /// Exact device to open; `None` means the platform default
    pub preferred_device_id: Option<String>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            want_audio: true,
            want_video: true,
            preferred_device_id: None,
            width: 1280,
            height: 720,
            frame_rate: 30,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

impl MediaConstraints {
    /// Video-only constraints pinned to one device, used when switching cameras
    pub fn video_device(device_id: &str) -> Self {
        Self {
            want_audio: false,
            want_video: true,
            preferred_device_id: Some(device_id.to_string()),
            ..Self::default()
        }
    }
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    device_id: Option<String>,
    label: String,
    enabled: AtomicBool,
    ended: watch::Sender<bool>,
}

/// Handle to one captured track.
///
/// Clones share state: disabling or stopping through one clone is visible
/// through all of them.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, source: TrackSource, device_id: Option<String>, label: impl Into<String>) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                source,
                device_id,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ended,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn device_id(&self) -> Option<&str> {
        self.inner.device_id.as_deref()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether frames are forwarded; capture keeps running either way
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    /// Stop the underlying source. Idempotent.
    pub fn stop(&self) {
        self.inner.ended.send_replace(true);
    }

    /// Resolves once the source has stopped, whether through `stop` or
    /// because the platform ended it (e.g. the user closed a screen share).
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("source", &self.inner.source)
            .field("device_id", &self.inner.device_id)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Tracks produced by one `acquire_local_media` call
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    pub audio: Option<MediaTrack>,
    pub video: Option<MediaTrack>,
}

impl LocalMedia {
    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.audio.iter().chain(self.video.iter())
    }
}

/// Capture backend
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Open microphone and/or camera per the constraints
    async fn acquire_local_media(&self, constraints: &MediaConstraints) -> Result<LocalMedia, MediaError>;

    /// Open a screen capture source (separate permission flow)
    async fn acquire_screen_capture(&self) -> Result<MediaTrack, MediaError>;

    /// Snapshot of the video inputs present right now
    async fn enumerate_video_inputs(&self) -> Result<Vec<VideoDevice>, MediaError>;

    /// Stop a single track's source. Idempotent.
    fn release(&self, track: &MediaTrack);
}

/// Index of the device after `current` in `devices`, wrapping around.
///
/// An unknown or absent current device selects the first entry.
pub fn next_device_index(devices: &[VideoDevice], current: Option<&str>) -> Option<usize> {
    if devices.is_empty() {
        return None;
    }
    let position = current.and_then(|id| devices.iter().position(|d| d.device_id == id));
    Some(match position {
        Some(idx) => (idx + 1) % devices.len(),
        None => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(ids: &[&str]) -> Vec<VideoDevice> {
        ids.iter()
            .map(|id| VideoDevice { device_id: id.to_string(), label: format!("cam {}", id) })
            .collect()
    }

    #[test]
    fn next_device_wraps_around() {
        let list = devices(&["front", "back", "usb"]);
        assert_eq!(next_device_index(&list, Some("front")), Some(1));
        assert_eq!(next_device_index(&list, Some("usb")), Some(0));
    }

    #[test]
    fn next_device_unknown_current_picks_first() {
        let list = devices(&["front", "back"]);
        assert_eq!(next_device_index(&list, Some("gone")), Some(0));
        assert_eq!(next_device_index(&list, None), Some(0));
        assert_eq!(next_device_index(&[], None), None);
    }

    #[test]
    fn next_device_single_entry_is_itself() {
        let list = devices(&["only"]);
        assert_eq!(next_device_index(&list, Some("only")), Some(0));
    }

    #[tokio::test]
    async fn stop_resolves_ended_for_all_clones() {
        let track = MediaTrack::new(TrackKind::Video, TrackSource::Screen, None, "screen");
        let watcher = track.clone();
        let waiter = tokio::spawn(async move { watcher.ended().await });
        track.stop();
        track.stop();
        waiter.await.unwrap();
        assert!(track.is_ended());
    }

    #[test]
    fn enabled_flag_is_shared() {
        let track = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, None, "mic");
        let clone = track.clone();
        clone.set_enabled(false);
        assert!(!track.is_enabled());
        assert!(track.same_track(&clone));
    }
}
