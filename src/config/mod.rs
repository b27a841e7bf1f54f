//! Configuration management for peercall

use crate::media::MediaConstraints;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Signaling relay configuration
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// ICE configuration
    #[serde(default)]
    pub ice: IceConfig,

    /// Local media configuration
    #[serde(default)]
    pub media: MediaConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay
    pub url: String,

    /// Path of the ICE endpoint on the relay's HTTP origin
    #[serde(default = "default_ice_path")]
    pub ice_path: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000/ws".to_string(),
            ice_path: default_ice_path(),
        }
    }
}

/// One STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    /// Fetch the server list from the relay before each session
    #[serde(default = "default_true")]
    pub fetch: bool,

    /// Servers used when the fetch fails or is disabled
    #[serde(default = "default_fallback_servers")]
    pub fallback_servers: Vec<IceServerConfig>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            fetch: true,
            fallback_servers: default_fallback_servers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Audio only; no camera is opened
    #[serde(default)]
    pub voice_only: bool,

    /// Preferred capture width in pixels
    pub width: u32,

    /// Preferred capture height in pixels
    pub height: u32,

    /// Preferred frame rate
    pub frame_rate: u32,

    #[serde(default = "default_true")]
    pub echo_cancellation: bool,

    #[serde(default = "default_true")]
    pub noise_suppression: bool,

    #[serde(default = "default_true")]
    pub auto_gain_control: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            voice_only: false,
            width: 1280,
            height: 720,
            frame_rate: 30,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.signaling.url.trim().is_empty() {
            return Err("Signaling URL must not be empty".into());
        }
        reqwest::Url::parse(&self.signaling.url)?;

        if !self.signaling.ice_path.starts_with('/') {
            return Err("Signaling ice_path must start with '/'".into());
        }

        if self.media.width == 0 || self.media.height == 0 {
            return Err("Media dimensions must be non-zero".into());
        }

        if self.media.frame_rate == 0 {
            return Err("Media frame rate must be non-zero".into());
        }

        for server in &self.ice.fallback_servers {
            if server.urls.iter().all(|u| u.trim().is_empty()) {
                return Err("ICE fallback servers need at least one URL".into());
            }
        }

        if !self.ice.fetch && self.ice.fallback_servers.is_empty() {
            return Err("ICE fetch is disabled and no fallback servers are configured".into());
        }

        Ok(())
    }

    /// Capture constraints for a new session
    pub fn media_constraints(&self) -> MediaConstraints {
        MediaConstraints {
            want_audio: true,
            want_video: !self.media.voice_only,
            preferred_device_id: None,
            width: self.media.width,
            height: self.media.height,
            frame_rate: self.media.frame_rate,
            echo_cancellation: self.media.echo_cancellation,
            noise_suppression: self.media.noise_suppression,
            auto_gain_control: self.media.auto_gain_control,
        }
    }

    /// HTTP URL of the ICE endpoint, on the same origin as the relay
    pub fn ice_url(&self) -> Result<String, Box<dyn std::error::Error>> {
        let mut url = reqwest::Url::parse(&self.signaling.url)?;
        let scheme = match url.scheme() {
            "ws" | "http" => "http",
            "wss" | "https" => "https",
            other => return Err(format!("Unsupported signaling scheme: {}", other).into()),
        };
        url.set_scheme(scheme).map_err(|_| "Failed to derive ICE endpoint scheme")?;
        url.set_path(&self.signaling.ice_path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url.to_string())
    }
}

fn default_true() -> bool {
    true
}

fn default_ice_path() -> String {
    "/ice".to_string()
}

fn default_fallback_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig {
        urls: vec!["stun:stun.l.google.com:19302".to_string()],
        username: None,
        credential: None,
    }]
}
