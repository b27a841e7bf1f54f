//! Synthetic capture backend for headless runs.
//!
//! Produces track handles without touching real devices. The device list and
//! permission answers are configurable so a call can run on machines with no
//! camera at all.

use super::{LocalMedia, MediaCapture, MediaConstraints, MediaError, MediaTrack, TrackKind, TrackSource, VideoDevice};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;

struct DummyState {
    devices: Vec<VideoDevice>,
    has_microphone: bool,
    permission_granted: bool,
    screen_supported: bool,
    screen_permission_granted: bool,
    live: Vec<MediaTrack>,
}

pub struct DummyCapture {
    state: Mutex<DummyState>,
}

impl Default for DummyCapture {
    fn default() -> Self {
        Self::with_cameras(&["dummy-camera-0"])
    }
}

impl DummyCapture {
    /// Backend exposing one video input per id, a microphone and screen capture
    pub fn with_cameras(ids: &[&str]) -> Self {
        let devices = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| VideoDevice { device_id: id.to_string(), label: format!("Dummy Camera {}", idx) })
            .collect();
        Self {
            state: Mutex::new(DummyState {
                devices,
                has_microphone: true,
                permission_granted: true,
                screen_supported: true,
                screen_permission_granted: true,
                live: Vec::new(),
            }),
        }
    }

    pub fn set_devices(&self, ids: &[&str]) {
        let mut state = self.state.lock();
        state.devices = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| VideoDevice { device_id: id.to_string(), label: format!("Dummy Camera {}", idx) })
            .collect();
    }

    pub fn set_permission_granted(&self, granted: bool) {
        self.state.lock().permission_granted = granted;
    }

    pub fn set_screen_capture(&self, supported: bool, granted: bool) {
        let mut state = self.state.lock();
        state.screen_supported = supported;
        state.screen_permission_granted = granted;
    }

    /// Tracks handed out and not yet stopped
    pub fn live_tracks(&self) -> Vec<MediaTrack> {
        let mut state = self.state.lock();
        state.live.retain(|t| !t.is_ended());
        state.live.clone()
    }

    fn track_for(&self, kind: TrackKind, source: TrackSource, device_id: Option<String>, label: String) -> MediaTrack {
        let track = MediaTrack::new(kind, source, device_id, label);
        self.state.lock().live.push(track.clone());
        track
    }
}

#[async_trait]
impl MediaCapture for DummyCapture {
    async fn acquire_local_media(&self, constraints: &MediaConstraints) -> Result<LocalMedia, MediaError> {
        let (granted, has_mic, camera) = {
            let state = self.state.lock();
            let camera = match constraints.preferred_device_id {
                Some(ref wanted) => state.devices.iter().find(|d| &d.device_id == wanted).cloned(),
                None => state.devices.first().cloned(),
            };
            (state.permission_granted, state.has_microphone, camera)
        };

        if !granted {
            return Err(MediaError::PermissionDenied("camera/microphone access refused".to_string()));
        }
        if constraints.want_audio && !has_mic {
            return Err(MediaError::NoMatchingDevice("no audio input".to_string()));
        }
        if constraints.want_video && camera.is_none() {
            let wanted = constraints.preferred_device_id.as_deref().unwrap_or("default");
            return Err(MediaError::NoMatchingDevice(format!("no video input matching {}", wanted)));
        }

        let audio = constraints.want_audio.then(|| {
            self.track_for(TrackKind::Audio, TrackSource::Microphone, None, "Dummy Microphone".to_string())
        });
        let video = match (constraints.want_video, camera) {
            (true, Some(device)) => Some(self.track_for(
                TrackKind::Video,
                TrackSource::Camera,
                Some(device.device_id),
                device.label,
            )),
            _ => None,
        };

        debug!(
            "Dummy capture acquired audio={} video={} ({}x{}@{})",
            audio.is_some(),
            video.is_some(),
            constraints.width,
            constraints.height,
            constraints.frame_rate
        );
        Ok(LocalMedia { audio, video })
    }

    async fn acquire_screen_capture(&self) -> Result<MediaTrack, MediaError> {
        let (supported, granted) = {
            let state = self.state.lock();
            (state.screen_supported, state.screen_permission_granted)
        };
        if !supported {
            return Err(MediaError::NotSupported("screen capture unavailable".to_string()));
        }
        if !granted {
            return Err(MediaError::PermissionDenied("screen capture refused".to_string()));
        }
        Ok(self.track_for(TrackKind::Video, TrackSource::Screen, None, "Dummy Screen".to_string()))
    }

    async fn enumerate_video_inputs(&self) -> Result<Vec<VideoDevice>, MediaError> {
        Ok(self.state.lock().devices.clone())
    }

    fn release(&self, track: &MediaTrack) {
        track.stop();
        self.state.lock().live.retain(|t| !t.same_track(track));
    }
}
