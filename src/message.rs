//! Line protocol definitions
//!
//! Newline-delimited UTF-8 text in both directions. Client lines are parsed
//! into a `ClientCommand`; server lines are built from a `ServerMessage`
//! whose `Display` output is the exact wire text (without terminator).

use std::fmt;

use crate::error::ChatError;
use crate::types::Avatar;

/// Static reply to `/help`
pub const HELP_TEXT: &str = "Available commands:
/connect <name> - Set your nickname and connect to the server
/room <name>    - Join or create a chat room
/who            - List users in your current room
/typing         - Tell your room you are typing
/typing-stop    - Tell your room you stopped typing
/help           - Show this help message
/bye            - Disconnect from the server

After connecting and joining a room, simply type messages to chat!";

/// Client → Server line
///
/// Anything not starting with `/` is chat text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `/connect <nickname>`
    Connect(String),
    /// `/room <name>`
    Room(String),
    /// `/who`
    Who,
    /// `/help`
    Help,
    /// `/bye`
    Bye,
    /// `/typing`
    Typing,
    /// `/typing-stop`
    TypingStop,
    /// Any other `/`-prefixed line
    Unknown(String),
    /// Plain chat text
    Chat(String),
}

impl ClientCommand {
    /// Classify one (already trimmed) input line
    pub fn parse(line: &str) -> Self {
        if !line.starts_with('/') {
            return ClientCommand::Chat(line.to_string());
        }

        let (verb, args) = match line.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };

        match verb {
            "/connect" => ClientCommand::Connect(args.to_string()),
            "/room" => ClientCommand::Room(args.to_string()),
            "/who" => ClientCommand::Who,
            "/help" => ClientCommand::Help,
            "/bye" => ClientCommand::Bye,
            "/typing" => ClientCommand::Typing,
            "/typing-stop" => ClientCommand::TypingStop,
            other => ClientCommand::Unknown(other.to_string()),
        }
    }
}

/// One `<room>: <members>` entry of the room listing sent after `WELCOME`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomListing {
    pub room: String,
    pub members: Vec<String>,
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once on accept
    Greeting,
    /// Identification succeeded
    Welcome { nickname: String, avatar: Avatar },
    /// Active rooms and their members (empty means none)
    RoomList(Vec<RoomListing>),
    /// Room joined
    Entered { room: String },
    /// `/who` result, entries already formatted as `[avatar] nick`
    Users(Vec<String>),
    /// Reply to `/bye`
    Goodbye,
    /// Peer started typing
    Typing { nickname: String },
    /// Peer stopped typing
    TypingStop { nickname: String },
    /// Member joined the room
    Joined { nickname: String, avatar: Avatar },
    /// Member left the room
    Left { nickname: String, avatar: Avatar },
    /// Formatted chat line, live or replayed from history
    Chat(String),
    /// Reply to `/help`
    Help,
    /// Unrecognised `/` command
    UnknownCommand,
    /// Protocol-state guidance (no `Error:` prefix)
    Notice(String),
    /// Rejected command or message
    Error(String),
}

impl ServerMessage {
    /// Build the wire text of a chat line
    pub fn chat_line(avatar: Avatar, nickname: &str, text: &str) -> String {
        format!("[{}] {}: {}", avatar, nickname, text)
    }

    /// Build a `/who` or listing entry
    pub fn member_entry(avatar: Avatar, nickname: &str) -> String {
        format!("[{}] {}", avatar, nickname)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Greeting => {
                write!(f, "Welcome to Tempest Server! Use /connect <name> to begin.")
            }
            ServerMessage::Welcome { nickname, avatar } => {
                write!(f, "WELCOME {} [{}]", nickname, avatar)
            }
            ServerMessage::RoomList(rooms) if rooms.is_empty() => {
                write!(f, "No active rooms. Use /room <name> to create one.")
            }
            ServerMessage::RoomList(rooms) => {
                write!(f, "ROOMS:")?;
                for listing in rooms {
                    write!(f, "\n  {}: {}", listing.room, listing.members.join(", "))?;
                }
                Ok(())
            }
            ServerMessage::Entered { room } => write!(f, "ENTERED {}", room),
            ServerMessage::Users(users) => write!(f, "USERS: {}", users.join(", ")),
            ServerMessage::Goodbye => write!(f, "GOODBYE"),
            ServerMessage::Typing { nickname } => write!(f, "TYPING {}", nickname),
            ServerMessage::TypingStop { nickname } => write!(f, "TYPING-STOP {}", nickname),
            ServerMessage::Joined { nickname, avatar } => {
                write!(f, "** [{}] {} has entered the room **", avatar, nickname)
            }
            ServerMessage::Left { nickname, avatar } => {
                write!(f, "** [{}] {} has left the room **", avatar, nickname)
            }
            ServerMessage::Chat(line) => write!(f, "{}", line),
            ServerMessage::Help => write!(f, "{}", HELP_TEXT),
            ServerMessage::UnknownCommand => {
                write!(f, "Unknown command. Type /help for available commands.")
            }
            ServerMessage::Notice(text) => write!(f, "{}", text),
            ServerMessage::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

/// Convert ChatError to ServerMessage for client notification
impl From<ChatError> for ServerMessage {
    fn from(err: ChatError) -> Self {
        if err.is_guidance() {
            ServerMessage::Notice(err.to_string())
        } else {
            ServerMessage::Error(err.to_string())
        }
    }
}
