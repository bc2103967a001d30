//! Error types for the chat server
//!
//! Defines fatal application errors, user-facing chat errors and
//! message send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Fatal application errors
///
/// These end a connection handler or abort server start-up.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// Recoverable errors reported back to the client
///
/// Each one becomes exactly one reply line; the connection stays open.
/// The `Display` text is the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Nickname failed format validation
    #[error("{0}")]
    InvalidNickname(String),

    /// Another identified session already uses this nickname
    #[error("Nickname already in use")]
    NicknameTaken,

    /// Room name failed format validation
    #[error("{0}")]
    InvalidRoomName(String),

    /// Command requires an argument that was not given
    #[error("{0}")]
    MissingArgument(&'static str),

    /// Input line exceeds the size limit
    #[error("Message too long (max {0} characters)")]
    MessageTooLong(usize),

    /// Creating another room would exceed the room cap
    #[error("Server room limit reached ({0} rooms)")]
    RoomLimitReached(usize),

    /// Connection cap reached
    #[error("Server full. Please try again later.")]
    ServerFull,

    /// Too many chat messages in the current window
    #[error("Rate limit exceeded. Please slow down.")]
    RateLimited,

    /// Command needs an identified session
    #[error("You must /connect first.")]
    NotConnected,

    /// `/who` outside of a room
    #[error("You must join a room first.")]
    NotInRoom,

    /// Chat text outside of a room
    #[error("You must /room <name> first.")]
    NotInRoomForChat,

    /// `/connect` from an already identified session
    #[error("You are already connected as {0}.")]
    AlreadyConnected(String),
}

impl ChatError {
    /// Protocol-state errors are answered with plain guidance text
    /// instead of an `Error:` line.
    pub fn is_guidance(&self) -> bool {
        matches!(
            self,
            ChatError::NotConnected
                | ChatError::NotInRoom
                | ChatError::NotInRoomForChat
                | ChatError::AlreadyConnected(_)
        )
    }
}

/// Message send errors
///
/// Occurs when a session's outbound channel is closed or backed up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
    /// The connection is not draining its outbound queue
    #[error("Outbound queue full")]
    QueueFull,
}
