//! peercall - 1:1 WebRTC call core
//!
//! Joins a room on a signaling relay, negotiates a single peer connection
//! with the partner and keeps it alive across mute, camera switches and
//! screen sharing.

pub mod args;
pub mod config;
pub mod ice;
pub mod media;
pub mod rtc;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{Config, IceServerConfig};
pub use ice::{HttpIceConfigSource, IceConfigSource, IceConfiguration, StaticIceConfigSource};
pub use media::{DummyCapture, LocalMedia, MediaCapture, MediaConstraints, MediaError, MediaTrack, TrackKind};
pub use rtc::{ConnectionState, SessionController, SessionError, SessionHandle, SessionNotification};
pub use transport::WsSignalingChannel;
