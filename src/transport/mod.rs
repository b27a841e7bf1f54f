//! Transport layer for peercall
//!
//! Carries signaling envelopes between the session controller and the relay.

pub mod websocket;

pub use websocket::WsSignalingChannel;
