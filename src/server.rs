//! ChatServer Actor implementation
//!
//! The central actor that owns the registry and runs the protocol state
//! machine. Connection handlers forward raw lines; each command is applied
//! to completion before the next one is taken, so every multi-step registry
//! operation is atomic with respect to all other connections.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::message::{ClientCommand, ServerMessage};
use crate::registry::{Departure, Registry};
use crate::session::SessionState;
use crate::types::ClientId;
use crate::validation::{sanitize, truncate_to_boundary};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// One input line from a connection
    Line { client_id: ClientId, line: String },
    /// Connection ended (EOF, read error, idle timeout, writer failure)
    Disconnect { client_id: ClientId },
    /// Close every session and stop the actor
    Shutdown,
}

/// The main ChatServer actor
pub struct ChatServer {
    registry: Registry,
    config: ServerConfig,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, config: ServerConfig) -> Self {
        Self {
            registry: Registry::new(&config),
            config,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until `Shutdown` arrives or all senders are dropped.
    pub async fn run(mut self) {
        info!(
            "ChatServer started (max clients: {}, max rooms: {})",
            self.config.max_clients, self.config.max_rooms
        );

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle_command(cmd).await {
                break;
            }
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command. Returns false when the actor should stop.
    async fn handle_command(&mut self, cmd: ServerCommand) -> bool {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender).await;
            }
            ServerCommand::Line { client_id, line } => {
                self.handle_line(client_id, line).await;
            }
            ServerCommand::Disconnect { client_id } => {
                self.evict(vec![client_id]).await;
            }
            ServerCommand::Shutdown => {
                let closed = self.registry.clear();
                info!("Closed {} session(s) for shutdown", closed);
                return false;
            }
        }
        true
    }

    /// Handle new connection
    async fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<ServerMessage>) {
        match self.registry.register(client_id, sender.clone()) {
            Ok(()) => {
                info!("Client {} connected", client_id);
                self.reply(client_id, ServerMessage::Greeting).await;
            }
            Err(err) => {
                warn!("Rejecting client {}: {}", client_id, err);
                // Dropping the sender afterwards closes the connection
                let _ = sender.try_send(err.into());
            }
        }
    }

    /// Route one input line
    async fn handle_line(&mut self, client_id: ClientId, line: String) {
        if self.registry.session(client_id).is_none() {
            debug!("Line from unknown client {} ignored", client_id);
            return;
        }

        if line.len() > self.config.max_message_length {
            self.reply_error(client_id, ChatError::MessageTooLong(self.config.max_message_length))
                .await;
            return;
        }

        match ClientCommand::parse(&line) {
            ClientCommand::Connect(nickname) => self.handle_identify(client_id, &nickname).await,
            ClientCommand::Room(name) => self.handle_join_room(client_id, &name).await,
            ClientCommand::Who => self.handle_who(client_id).await,
            ClientCommand::Help => self.reply(client_id, ServerMessage::Help).await,
            ClientCommand::Bye => self.handle_bye(client_id).await,
            ClientCommand::Typing => self.handle_typing(client_id).await,
            ClientCommand::TypingStop => self.handle_stop_typing(client_id).await,
            ClientCommand::Unknown(verb) => {
                debug!("Client {} sent unknown command {}", client_id, verb);
                self.reply(client_id, ServerMessage::UnknownCommand).await;
            }
            ClientCommand::Chat(text) => self.handle_chat(client_id, &text).await,
        }
    }

    fn state_of(&self, client_id: ClientId) -> SessionState {
        self.registry
            .session(client_id)
            .map(|s| s.state())
            .unwrap_or(SessionState::Anonymous)
    }

    /// Handle `/connect <nickname>`
    async fn handle_identify(&mut self, client_id: ClientId, nickname: &str) {
        if nickname.is_empty() && self.state_of(client_id) == SessionState::Anonymous {
            self.reply_error(client_id, ChatError::MissingArgument("/connect requires a nickname"))
                .await;
            return;
        }

        match self.registry.identify(client_id, nickname) {
            Ok((nickname, avatar)) => {
                self.reply(client_id, ServerMessage::Welcome { nickname, avatar })
                    .await;
                let listing = self.registry.room_listing();
                self.reply(client_id, ServerMessage::RoomList(listing)).await;
            }
            Err(err) => self.reply_error(client_id, err).await,
        }
    }

    /// Handle `/room <name>`
    async fn handle_join_room(&mut self, client_id: ClientId, name: &str) {
        if self.state_of(client_id) == SessionState::Anonymous {
            self.reply_error(client_id, ChatError::NotConnected).await;
            return;
        }
        if name.is_empty() {
            self.reply_error(client_id, ChatError::MissingArgument("/room requires a room name"))
                .await;
            return;
        }

        let outcome = match self.registry.join_room(client_id, name) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.reply_error(client_id, err).await;
                return;
            }
        };

        if let Some(departure) = &outcome.departure {
            let failed = self.announce_departure(departure);
            self.evict(failed).await;
        }

        self.reply(
            client_id,
            ServerMessage::Entered {
                room: outcome.room.clone(),
            },
        )
        .await;
        for line in outcome.history {
            self.reply(client_id, ServerMessage::Chat(line)).await;
        }

        if !outcome.rejoined {
            let notice = ServerMessage::Joined {
                nickname: outcome.nickname,
                avatar: outcome.avatar,
            };
            self.fan_out(&outcome.room, notice, None).await;
        }
    }

    /// Handle `/who`
    async fn handle_who(&mut self, client_id: ClientId) {
        let room = match self.registry.session(client_id) {
            Some(session) => match session.state() {
                SessionState::Anonymous => Err(ChatError::NotConnected),
                SessionState::Identified => Err(ChatError::NotInRoom),
                SessionState::InRoom => session.room.clone().ok_or(ChatError::NotInRoom),
            },
            None => return,
        };

        match room {
            Ok(room) => {
                let users = self
                    .registry
                    .list_members(&room)
                    .into_iter()
                    .map(|(avatar, nick)| ServerMessage::member_entry(avatar, &nick))
                    .collect();
                self.reply(client_id, ServerMessage::Users(users)).await;
            }
            Err(err) => self.reply_error(client_id, err).await,
        }
    }

    /// Handle `/bye`
    async fn handle_bye(&mut self, client_id: ClientId) {
        if let Some(session) = self.registry.session(client_id) {
            info!("{} disconnected gracefully", session.display_name());
        }
        self.reply(client_id, ServerMessage::Goodbye).await;
        self.evict(vec![client_id]).await;
    }

    /// Handle typing indicator start
    async fn handle_typing(&mut self, client_id: ClientId) {
        if let Some((room, nickname)) = self.registry.start_typing(client_id) {
            self.fan_out(&room, ServerMessage::Typing { nickname }, Some(client_id))
                .await;
        }
    }

    /// Handle typing indicator stop
    async fn handle_stop_typing(&mut self, client_id: ClientId) {
        if let Some((room, nickname)) = self.registry.stop_typing(client_id) {
            self.fan_out(&room, ServerMessage::TypingStop { nickname }, Some(client_id))
                .await;
        }
    }

    /// Handle a plain chat line
    async fn handle_chat(&mut self, client_id: ClientId, text: &str) {
        let (identity, room) = match self.registry.session(client_id) {
            Some(session) => (
                session.identity().map(|(n, a)| (n.to_string(), a)),
                session.room.clone(),
            ),
            None => return,
        };
        let Some((nickname, avatar)) = identity else {
            self.reply_error(client_id, ChatError::NotConnected).await;
            return;
        };
        let Some(room) = room else {
            self.reply_error(client_id, ChatError::NotInRoomForChat).await;
            return;
        };

        if let Err(err) = self.registry.check_rate(client_id) {
            self.reply_error(client_id, err).await;
            return;
        }

        let content = sanitize(truncate_to_boundary(text, self.config.max_message_length));
        if content.is_empty() {
            return;
        }

        // Sending a message ends the typing indicator
        self.handle_stop_typing(client_id).await;

        let line = ServerMessage::chat_line(avatar, &nickname, &content);
        debug!("Room '{}' - {}", room, line);
        self.registry.append_history(&room, line.clone());
        self.fan_out(&room, ServerMessage::Chat(line), None).await;
    }

    /// Tell the room a member left it
    ///
    /// Returns members that could not be reached.
    fn announce_departure(&self, departure: &Departure) -> Vec<ClientId> {
        if departure.room_closed {
            return Vec::new();
        }

        let mut failed = Vec::new();
        if departure.was_typing {
            let stop = ServerMessage::TypingStop {
                nickname: departure.nickname.clone(),
            };
            failed.extend(self.deliver(&departure.room, &stop, None));
        }
        let notice = ServerMessage::Left {
            nickname: departure.nickname.clone(),
            avatar: departure.avatar,
        };
        failed.extend(self.deliver(&departure.room, &notice, None));
        failed
    }

    /// Deliver a message to a room snapshot without touching the registry
    fn deliver(&self, room: &str, msg: &ServerMessage, exclude: Option<ClientId>) -> Vec<ClientId> {
        let recipients = self.registry.recipients(room, exclude);
        broadcast(recipients, msg)
    }

    /// Broadcast to a room and drop every member that could not be reached
    async fn fan_out(&mut self, room: &str, msg: ServerMessage, exclude: Option<ClientId>) {
        let failed = self.deliver(room, &msg, exclude);
        self.evict(failed).await;
    }

    /// Remove sessions, notifying their rooms.
    ///
    /// Notification failures queue further removals until none remain.
    async fn evict(&mut self, ids: Vec<ClientId>) {
        let mut pending: VecDeque<ClientId> = ids.into();

        while let Some(client_id) = pending.pop_front() {
            let Some(departure) = self.registry.remove(client_id) else {
                continue;
            };
            let failed = self.announce_departure(&departure);
            pending.extend(failed);
        }
    }

    /// Send a line to one session, dropping the session if it is unreachable
    async fn reply(&mut self, client_id: ClientId, msg: ServerMessage) {
        let Some(session) = self.registry.session(client_id) else {
            return;
        };
        if let Err(e) = session.send(msg) {
            debug!("Reply to {} failed ({}), dropping session", client_id, e);
            self.evict(vec![client_id]).await;
        }
    }

    async fn reply_error(&mut self, client_id: ClientId, err: ChatError) {
        debug!("Client {} rejected: {}", client_id, err);
        self.reply(client_id, err.into()).await;
    }
}
