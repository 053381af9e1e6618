//! Supabase Realtime transport over the Phoenix Channels v1 protocol.
//!
//! A WebSocket client built on `tokio-tungstenite`. Handles heartbeats,
//! channel join/leave, broadcast, presence tracking, and auto-reconnect
//! with backoff. Presence frames are folded into a full per-channel state
//! before they reach the synchronization core.

mod client;
mod connection;
mod handler;
mod registry;
mod types;

pub use client::RealtimeTransport;
pub use types::PhoenixMessage;
