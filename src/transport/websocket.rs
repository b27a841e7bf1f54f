//! WebSocket signaling client
//!
//! One connection to the relay, split into a writer task fed by an mpsc queue
//! and a reader task that decodes envelopes into `RelayEvent`s.

use crate::rtc::signaling::{OutboundMessage, RelayEvent, SignalingChannel};
use crate::rtc::SessionError;
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use std::fmt::Display;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::WebSocketStream;

/// Signaling channel over a relay WebSocket
pub struct WsSignalingChannel {
    outbound: mpsc::UnboundedSender<Message>,
}

impl WsSignalingChannel {
    /// Connect to the relay. Inbound events arrive on the returned receiver;
    /// the last one is always `RelayEvent::Disconnected`.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<RelayEvent>), SessionError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| SessionError::Signaling(format!("Failed to connect to {}: {}", url, e)))?;
        info!("Connected to signaling relay {}", url);
        Ok(Self::from_stream(ws_stream))
    }

    /// Run the channel over an already established WebSocket
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>) -> (Self, mpsc::UnboundedReceiver<RelayEvent>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (write, read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(write, outbound_rx));
        tokio::spawn(read_loop(read, events_tx));

        (Self { outbound: outbound_tx }, events_rx)
    }

    /// Ask the relay to close the connection
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        let text = message.to_json()?;
        debug!("Relay <- {}", message.event_name());
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| SessionError::Signaling("relay connection closed".to_string()))
    }
}

async fn write_loop<W>(mut write: W, mut outbound: mpsc::UnboundedReceiver<Message>)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = write.send(message).await {
            warn!("Signaling write error: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

async fn read_loop<R>(mut read: R, events: mpsc::UnboundedSender<RelayEvent>)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = read.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!("Signaling read error: {}", e);
                break;
            }
        };

        match message {
            Message::Text(text) => match RelayEvent::from_json(&text) {
                Ok(event) => {
                    debug!("Relay -> {:?}", event);
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Skipping relay frame: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("Signaling relay connection closed");
    let _ = events.send(RelayEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc::signaling::PeerId;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn exchanges_envelopes_with_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"event":"bogus","data":{}}"#.to_string())).await.unwrap();
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"peer-joined","data":{"id":"B"}}"#.to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            first
        });

        let (channel, mut events) = WsSignalingChannel::connect(&format!("ws://{}", addr)).await.unwrap();
        channel.send(OutboundMessage::Join { room_id: "abc".to_string() }).await.unwrap();

        assert_eq!(events.recv().await, Some(RelayEvent::PeerJoined { id: PeerId::new("B") }));
        assert_eq!(events.recv().await, Some(RelayEvent::Disconnected));

        let first = relay.await.unwrap();
        let envelope: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(envelope, json!({ "event": "join", "data": { "roomId": "abc" } }));
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_signaling_error() {
        let err = WsSignalingChannel::connect("ws://127.0.0.1:9/ws").await.err().unwrap();
        assert_eq!(err.kind(), "signaling");
    }
}
