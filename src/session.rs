//! Session struct definition
//!
//! Represents one live connection with its identity, room and outbound channel.

use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{Avatar, ClientId};

/// Where a session is in the connect → identify → join progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no nickname yet
    Anonymous,
    /// Nickname assigned, not in a room
    Identified,
    /// Member of a room
    InRoom,
}

/// Connected session information
///
/// Rate-limit and typing state live in the registry next to the
/// session map, keyed by the same `ClientId`.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Nickname (None before `/connect`)
    pub nickname: Option<String>,
    /// Avatar glyph (None before `/connect`)
    pub avatar: Option<Avatar>,
    /// Current room name (None until `/room`)
    pub room: Option<String>,
    /// Server → Client line channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// When the connection was accepted
    pub connected_at: Instant,
}

impl Session {
    /// Create a new anonymous session with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            nickname: None,
            avatar: None,
            room: None,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Queue a line for this session without waiting
    ///
    /// Fails if the connection is gone or is not keeping up with its queue.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    pub fn state(&self) -> SessionState {
        match (&self.nickname, &self.room) {
            (None, _) => SessionState::Anonymous,
            (Some(_), None) => SessionState::Identified,
            (Some(_), Some(_)) => SessionState::InRoom,
        }
    }

    /// Nickname and avatar, once identified
    pub fn identity(&self) -> Option<(&str, Avatar)> {
        match (&self.nickname, self.avatar) {
            (Some(nickname), Some(avatar)) => Some((nickname.as_str(), avatar)),
            _ => None,
        }
    }

    /// Get the display name for this session
    ///
    /// Returns the nickname if set, otherwise "anonymous".
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or("anonymous")
    }

    pub fn identify(&mut self, nickname: String, avatar: Avatar) {
        self.nickname = Some(nickname);
        self.avatar = Some(avatar);
    }
}
