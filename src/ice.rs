//! ICE server configuration
//!
//! Fetched once per session start and handed to the connection factory
//! unchanged.

use crate::config::IceServerConfig;
use crate::rtc::SessionError;
use async_trait::async_trait;
use log::{info, warn};
use serde_json::{json, Value};
use std::time::Duration;

/// Opaque ICE configuration (`{"iceServers": [...]}`), immutable per session
#[derive(Debug, Clone, PartialEq)]
pub struct IceConfiguration {
    raw: Value,
}

impl IceConfiguration {
    pub fn from_json(raw: Value) -> Self {
        Self { raw }
    }

    pub fn from_servers(servers: &[IceServerConfig]) -> Self {
        let entries: Vec<Value> = servers
            .iter()
            .map(|server| {
                let mut entry = json!({ "urls": server.urls });
                if let Some(ref username) = server.username {
                    entry["username"] = json!(username);
                }
                if let Some(ref credential) = server.credential {
                    entry["credential"] = json!(credential);
                }
                entry
            })
            .collect();
        Self { raw: json!({ "iceServers": entries }) }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Typed view of `iceServers`; entries without URLs are skipped
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.raw
            .get("iceServers")
            .and_then(Value::as_array)
            .map(|servers| servers.iter().filter_map(parse_server).collect())
            .unwrap_or_default()
    }
}

fn parse_server(entry: &Value) -> Option<IceServerConfig> {
    let urls: Vec<String> = match entry.get("urls")? {
        Value::String(url) => vec![url.clone()],
        Value::Array(items) => items.iter().filter_map(|u| u.as_str().map(str::to_string)).collect(),
        _ => return None,
    };
    if urls.is_empty() {
        return None;
    }
    Some(IceServerConfig {
        urls,
        username: entry.get("username").and_then(Value::as_str).map(str::to_string),
        credential: entry.get("credential").and_then(Value::as_str).map(str::to_string),
    })
}

/// Where a session gets its ICE configuration from
#[async_trait]
pub trait IceConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<IceConfiguration, SessionError>;
}

/// Serves a fixed server list
pub struct StaticIceConfigSource {
    config: IceConfiguration,
}

impl StaticIceConfigSource {
    pub fn new(servers: &[IceServerConfig]) -> Self {
        Self { config: IceConfiguration::from_servers(servers) }
    }
}

#[async_trait]
impl IceConfigSource for StaticIceConfigSource {
    async fn fetch(&self) -> Result<IceConfiguration, SessionError> {
        Ok(self.config.clone())
    }
}

/// Fetches `{origin}/ice` from the signaling server
pub struct HttpIceConfigSource {
    url: String,
    fallback: Vec<IceServerConfig>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpIceConfigSource {
    pub fn new(url: impl Into<String>, fallback: Vec<IceServerConfig>) -> Self {
        Self {
            url: url.into(),
            fallback,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    async fn fetch_remote(&self) -> Result<Value, reqwest::Error> {
        self.client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

#[async_trait]
impl IceConfigSource for HttpIceConfigSource {
    async fn fetch(&self) -> Result<IceConfiguration, SessionError> {
        match self.fetch_remote().await {
            Ok(raw) => {
                info!("ICE config loaded from {}", self.url);
                Ok(IceConfiguration::from_json(raw))
            }
            Err(e) if !self.fallback.is_empty() => {
                warn!("Failed to fetch ICE config from {}: {}, using fallback servers", self.url, e);
                Ok(IceConfiguration::from_servers(&self.fallback))
            }
            Err(e) => Err(SessionError::IceConfig(format!("Failed to fetch {}: {}", self.url, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stun() -> IceServerConfig {
        IceServerConfig {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        }
    }

    #[test]
    fn typed_view_accepts_string_and_list_urls() {
        let config = IceConfiguration::from_json(json!({
            "iceServers": [
                { "urls": "stun:stun.example.org:3478" },
                { "urls": ["turn:turn.example.org:3478?transport=udp"], "username": "u", "credential": "p" },
                { "urls": [] },
                { "username": "orphan" }
            ]
        }));
        let servers = config.ice_servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.org:3478".to_string()]);
        assert_eq!(servers[1].username.as_deref(), Some("u"));
        assert_eq!(servers[1].credential.as_deref(), Some("p"));
    }

    #[test]
    fn from_servers_round_trips_through_typed_view() {
        let config = IceConfiguration::from_servers(&[stun()]);
        assert_eq!(config.ice_servers(), vec![stun()]);
        assert!(config.raw()["iceServers"][0].get("username").is_none());
    }

    #[tokio::test]
    async fn static_source_serves_configured_servers() {
        let source = StaticIceConfigSource::new(&[stun()]);
        let config = source.fetch().await.unwrap();
        assert_eq!(config.ice_servers().len(), 1);
    }

    #[tokio::test]
    async fn http_source_falls_back_when_unreachable() {
        let source = HttpIceConfigSource::new("http://127.0.0.1:9/ice", vec![stun()]);
        let config = source.fetch().await.unwrap();
        assert_eq!(config.ice_servers(), vec![stun()]);
    }

    #[tokio::test]
    async fn http_source_without_fallback_errors() {
        let source = HttpIceConfigSource::new("http://127.0.0.1:9/ice", Vec::new());
        let err = source.fetch().await.unwrap_err();
        assert_eq!(err.kind(), "ice-config");
    }
}
