//! Server configuration
//!
//! Capacity limits, throttling and timeouts. Everything has a default so a
//! config file only needs to name the values it overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Runtime configuration for the chat server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,
    /// TCP port to listen on (0 picks a free port)
    pub port: u16,
    /// Maximum number of simultaneously connected sessions
    pub max_clients: usize,
    /// Maximum number of live rooms
    pub max_rooms: usize,
    /// History lines kept per room
    pub max_messages_per_room: usize,
    /// History lines replayed to a member on join
    pub history_replay: usize,
    /// Longest accepted input line, in bytes
    pub max_message_length: usize,
    /// Chat messages allowed per rate window
    pub rate_limit_messages: u32,
    /// Rate window length in seconds
    pub rate_limit_window_secs: u64,
    /// Seconds of silence before a connection is dropped
    pub idle_timeout_secs: u64,
    /// Per-session outbound queue depth
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1991,
            max_clients: 100,
            max_rooms: 50,
            max_messages_per_room: 100,
            history_replay: 10,
            max_message_length: 500,
            rate_limit_messages: 20,
            rate_limit_window_secs: 60,
            idle_timeout_secs: 60 * 60,
            outbound_buffer: 256,
        }
    }
}

impl ServerConfig {
    /// Load a (possibly partial) JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse a (possibly partial) JSON config document
    pub fn from_json_str(raw: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// `host:port` string suitable for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
