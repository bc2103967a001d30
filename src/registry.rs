//! Room registry
//!
//! Owns every session, room, history buffer, rate window and typing flag.
//! All mutation goes through the methods here, each of which leaves the
//! membership invariants intact:
//!
//! - `session.room == Some(r)` exactly when the session is a member of `rooms[r]`
//! - a room exists exactly while it has at least one member
//! - a session is in at most one room
//! - history never exceeds the per-room cap
//!
//! The registry is not synchronised; it is owned by the `ChatServer` actor
//! which applies one command at a time.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::message::{RoomListing, ServerMessage};
use crate::rate_limit::RateLimiter;
use crate::room::Room;
use crate::session::Session;
use crate::typing::TypingTracker;
use crate::types::{Avatar, ClientId};
use crate::validation::{validate_nickname, validate_room_name};

/// A session leaving a room, as seen by the members left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room: String,
    pub nickname: String,
    pub avatar: Avatar,
    /// The session was flagged as typing when it left
    pub was_typing: bool,
    /// The room was deleted because nobody is left
    pub room_closed: bool,
}

/// Result of a successful `join_room`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Sanitized name of the room now occupied
    pub room: String,
    pub nickname: String,
    pub avatar: Avatar,
    /// Previous room, when the session switched rooms
    pub departure: Option<Departure>,
    /// The session was already in this room; nothing changed
    pub rejoined: bool,
    /// Lines to replay to the joiner, oldest first
    pub history: Vec<String>,
}

/// Outbound handle of one room member, captured for a fan-out
pub type Recipient = (ClientId, mpsc::Sender<ServerMessage>);

/// Process-wide chat state
#[derive(Debug)]
pub struct Registry {
    sessions: HashMap<ClientId, Session>,
    rooms: HashMap<String, Room>,
    rate_limiter: RateLimiter,
    typing: TypingTracker,
    max_clients: usize,
    max_rooms: usize,
    history_limit: usize,
    history_replay: usize,
}

impl Registry {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            rooms: HashMap::new(),
            rate_limiter: RateLimiter::new(
                config.rate_limit_messages,
                config.rate_limit_window(),
            ),
            typing: TypingTracker::new(),
            max_clients: config.max_clients,
            max_rooms: config.max_rooms,
            history_limit: config.max_messages_per_room,
            history_replay: config.history_replay,
        }
    }

    /// Admit a new anonymous session
    pub fn register(
        &mut self,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), ChatError> {
        if self.sessions.len() >= self.max_clients {
            return Err(ChatError::ServerFull);
        }
        self.sessions.insert(client_id, Session::new(client_id, sender));
        debug!(
            "Total sessions: {}/{}, Total rooms: {}",
            self.sessions.len(),
            self.max_clients,
            self.rooms.len()
        );
        Ok(())
    }

    /// Assign a nickname and avatar to an anonymous session
    pub fn identify(
        &mut self,
        client_id: ClientId,
        raw_nickname: &str,
    ) -> Result<(String, Avatar), ChatError> {
        let session = self.sessions.get(&client_id).ok_or(ChatError::NotConnected)?;
        if let Some(current) = &session.nickname {
            return Err(ChatError::AlreadyConnected(current.clone()));
        }

        let nickname = validate_nickname(raw_nickname)?;
        let wanted = nickname.to_lowercase();
        let taken = self.sessions.values().any(|other| {
            other.id != client_id
                && other
                    .nickname
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase() == wanted)
        });
        if taken {
            return Err(ChatError::NicknameTaken);
        }

        let avatar = Avatar::random();
        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.identify(nickname.clone(), avatar);
        }
        info!("Client {} identified as '{}' [{}]", client_id, nickname, avatar);
        Ok((nickname, avatar))
    }

    /// Move an identified session into a room, leaving its current one first
    pub fn join_room(
        &mut self,
        client_id: ClientId,
        raw_name: &str,
    ) -> Result<JoinOutcome, ChatError> {
        let session = self.sessions.get(&client_id).ok_or(ChatError::NotConnected)?;
        let (nickname, avatar) = session
            .identity()
            .map(|(n, a)| (n.to_string(), a))
            .ok_or(ChatError::NotConnected)?;
        let current = session.room.clone();

        let name = validate_room_name(raw_name)?;

        if current.as_deref() == Some(name.as_str()) {
            return Ok(JoinOutcome {
                history: self.recent_history(&name, self.history_replay),
                room: name,
                nickname,
                avatar,
                departure: None,
                rejoined: true,
            });
        }

        if !self.rooms.contains_key(&name) {
            let frees_slot = current
                .as_ref()
                .and_then(|r| self.rooms.get(r))
                .is_some_and(|r| r.member_count() == 1);
            let live = self.rooms.len() - usize::from(frees_slot);
            if live >= self.max_rooms {
                return Err(ChatError::RoomLimitReached(self.max_rooms));
            }
        }

        let departure = self.leave_room(client_id);

        let history_limit = self.history_limit;
        let room = self.rooms.entry(name.clone()).or_insert_with(|| {
            info!("Room '{}' created", name);
            Room::new(name.clone(), history_limit)
        });
        room.add_member(client_id);
        let history = room.recent_history(self.history_replay);

        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.room = Some(name.clone());
        }
        info!("{} [{}] joined room '{}'", nickname, avatar, name);

        Ok(JoinOutcome {
            room: name,
            nickname,
            avatar,
            departure,
            rejoined: false,
            history,
        })
    }

    /// Detach a session from its room, deleting the room if it empties
    fn leave_room(&mut self, client_id: ClientId) -> Option<Departure> {
        let session = self.sessions.get_mut(&client_id)?;
        let room_name = session.room.take()?;
        let (nickname, avatar) = session.identity().map(|(n, a)| (n.to_string(), a))?;
        let was_typing = self.typing.stop(client_id);

        let room_closed = match self.rooms.get_mut(&room_name) {
            Some(room) => room.remove_member(client_id),
            None => false,
        };
        if room_closed {
            if let Some(room) = self.rooms.remove(&room_name) {
                info!(
                    "Room '{}' deleted (empty) after {:?}",
                    room.name,
                    room.created_at.elapsed()
                );
            }
        }
        info!("{} [{}] left room '{}'", nickname, avatar, room_name);

        Some(Departure {
            room: room_name,
            nickname,
            avatar,
            was_typing,
            room_closed,
        })
    }

    /// Tear down a session entirely. Idempotent.
    ///
    /// Returns the room departure, if the session was in a room.
    pub fn remove(&mut self, client_id: ClientId) -> Option<Departure> {
        if !self.sessions.contains_key(&client_id) {
            return None;
        }
        let departure = self.leave_room(client_id);
        self.rate_limiter.remove(client_id);
        self.typing.remove(client_id);
        if let Some(session) = self.sessions.remove(&client_id) {
            info!(
                "Session {} ({}) removed after {:?}",
                client_id,
                session.display_name(),
                session.connected_at.elapsed()
            );
        }
        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.sessions.len(),
            self.rooms.len()
        );
        departure
    }

    /// Drop every session and room (server shutdown)
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        let ids: Vec<ClientId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
        count
    }

    /// `[avatar] nick` entries of a room, in join order
    pub fn list_members(&self, room: &str) -> Vec<(Avatar, String)> {
        let Some(room) = self.rooms.get(room) else {
            return Vec::new();
        };
        room.members()
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .filter_map(|s| s.identity().map(|(n, a)| (a, n.to_string())))
            .collect()
    }

    /// Every live room with its members, sorted by room name
    pub fn room_listing(&self) -> Vec<RoomListing> {
        let mut listing: Vec<RoomListing> = self
            .rooms
            .keys()
            .map(|name| RoomListing {
                room: name.clone(),
                members: self
                    .list_members(name)
                    .into_iter()
                    .map(|(avatar, nick)| ServerMessage::member_entry(avatar, &nick))
                    .collect(),
            })
            .collect();
        listing.sort_by(|a, b| a.room.cmp(&b.room));
        listing
    }

    /// Append a formatted line to a room's history
    pub fn append_history(&mut self, room: &str, line: String) {
        if let Some(room) = self.rooms.get_mut(room) {
            room.push_history(line);
        }
    }

    pub fn recent_history(&self, room: &str, count: usize) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|r| r.recent_history(count))
            .unwrap_or_default()
    }

    /// Snapshot of a room's member channels, optionally excluding one member
    pub fn recipients(&self, room: &str, exclude: Option<ClientId>) -> Vec<Recipient> {
        let Some(room) = self.rooms.get(room) else {
            return Vec::new();
        };
        room.members()
            .iter()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| self.sessions.get(id).map(|s| (*id, s.sender.clone())))
            .collect()
    }

    /// Consult the rate limiter for a chat message
    pub fn check_rate(&mut self, client_id: ClientId) -> Result<(), ChatError> {
        self.rate_limiter.check(client_id)
    }

    /// Flag a session as typing. Returns its room and nickname on a real transition.
    pub fn start_typing(&mut self, client_id: ClientId) -> Option<(String, String)> {
        let session = self.sessions.get(&client_id)?;
        let room = session.room.clone()?;
        let nickname = session.nickname.clone()?;
        self.typing.start(client_id).then_some((room, nickname))
    }

    /// Clear a session's typing flag. Returns its room and nickname on a real transition.
    pub fn stop_typing(&mut self, client_id: ClientId) -> Option<(String, String)> {
        let session = self.sessions.get(&client_id)?;
        let room = session.room.clone()?;
        let nickname = session.nickname.clone()?;
        self.typing.stop(client_id).then_some((room, nickname))
    }

    pub fn session(&self, client_id: ClientId) -> Option<&Session> {
        self.sessions.get(&client_id)
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub(crate) fn room_count(&self) -> usize {
        self.rooms.len()
    }

    #[cfg(test)]
    pub(crate) fn has_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Panic if any membership invariant is broken
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for session in self.sessions.values() {
            if let Some(room) = &session.room {
                let room = self.rooms.get(room).expect("session points at missing room");
                assert!(room.contains(session.id), "session not listed in its room");
            }
        }
        for (name, room) in &self.rooms {
            assert!(!room.is_empty(), "empty room '{}' kept alive", name);
            assert!(room.history_len() <= self.history_limit);
            for id in room.members() {
                let session = self.sessions.get(id).expect("room lists unknown session");
                assert_eq!(session.room.as_deref(), Some(name.as_str()));
            }
        }
        assert!(self.sessions.len() <= self.max_clients);
        assert!(self.rooms.len() <= self.max_rooms);
        assert!(self.rate_limiter.tracked() <= self.sessions.len());
        assert!(self.typing.tracked() <= self.sessions.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(max_clients: usize, max_rooms: usize) -> Registry {
        Registry::new(&ServerConfig {
            max_clients,
            max_rooms,
            ..ServerConfig::default()
        })
    }

    fn connect(
        registry: &mut Registry,
        nickname: &str,
    ) -> (ClientId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(32);
        let id = ClientId::new();
        registry.register(id, tx).unwrap();
        registry.identify(id, nickname).unwrap();
        (id, rx)
    }

    #[test]
    fn test_register_respects_client_cap() {
        let mut registry = registry_with(1, 10);
        let (tx, _rx) = mpsc::channel(1);
        assert!(registry.register(ClientId::new(), tx.clone()).is_ok());
        assert_eq!(
            registry.register(ClientId::new(), tx),
            Err(ChatError::ServerFull)
        );
    }

    #[test]
    fn test_identify_rejects_duplicates_case_insensitively() {
        let mut registry = registry_with(10, 10);
        connect(&mut registry, "Alice");

        let (tx, _rx) = mpsc::channel(1);
        let id = ClientId::new();
        registry.register(id, tx).unwrap();
        assert_eq!(registry.identify(id, "alice"), Err(ChatError::NicknameTaken));
        assert!(registry.session(id).unwrap().nickname.is_none());
        assert!(registry.identify(id, "alice2").is_ok());
    }

    #[test]
    fn test_nickname_released_on_remove() {
        let mut registry = registry_with(10, 10);
        let (alice, _rx) = connect(&mut registry, "alice");
        registry.remove(alice);

        let (tx, _rx2) = mpsc::channel(1);
        let id = ClientId::new();
        registry.register(id, tx).unwrap();
        assert!(registry.identify(id, "ALICE").is_ok());
    }

    #[test]
    fn test_identify_invalid_nickname_assigns_nothing() {
        let mut registry = registry_with(10, 10);
        let (tx, _rx) = mpsc::channel(1);
        let id = ClientId::new();
        registry.register(id, tx).unwrap();

        assert!(matches!(
            registry.identify(id, "bad<name>"),
            Err(ChatError::InvalidNickname(_))
        ));
        let session = registry.session(id).unwrap();
        assert!(session.nickname.is_none());
        assert!(session.avatar.is_none());
    }

    #[test]
    fn test_identify_twice_is_state_error() {
        let mut registry = registry_with(10, 10);
        let (id, _rx) = connect(&mut registry, "alice");
        assert_eq!(
            registry.identify(id, "bob"),
            Err(ChatError::AlreadyConnected("alice".to_string()))
        );
    }

    #[test]
    fn test_join_requires_identity() {
        let mut registry = registry_with(10, 10);
        let (tx, _rx) = mpsc::channel(1);
        let id = ClientId::new();
        registry.register(id, tx).unwrap();

        assert_eq!(registry.join_room(id, "#lobby"), Err(ChatError::NotConnected));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_switching_rooms_cleans_up() {
        let mut registry = registry_with(10, 10);
        let (alice, _rx) = connect(&mut registry, "alice");

        let outcome = registry.join_room(alice, "#one").unwrap();
        assert!(outcome.departure.is_none());
        registry.append_history("#one", "[x] alice: hi".to_string());

        let outcome = registry.join_room(alice, "#two").unwrap();
        let departure = outcome.departure.unwrap();
        assert_eq!(departure.room, "#one");
        assert!(departure.room_closed);
        assert!(!registry.has_room("#one"));
        assert!(registry.has_room("#two"));
        registry.assert_consistent();

        // Recreated room starts with empty history
        registry.join_room(alice, "#one").unwrap();
        assert!(registry.recent_history("#one", 10).is_empty());
        registry.assert_consistent();
    }

    #[test]
    fn test_rejoining_same_room_is_noop() {
        let mut registry = registry_with(10, 10);
        let (alice, _rx) = connect(&mut registry, "alice");
        registry.join_room(alice, "#one").unwrap();
        registry.append_history("#one", "kept".to_string());

        let outcome = registry.join_room(alice, "#one").unwrap();
        assert!(outcome.rejoined);
        assert_eq!(outcome.history, vec!["kept"]);
        assert_eq!(registry.list_members("#one").len(), 1);
    }

    #[test]
    fn test_room_cap_only_applies_to_new_rooms() {
        let mut registry = registry_with(10, 1);
        let (alice, _a) = connect(&mut registry, "alice");
        let (bob, _b) = connect(&mut registry, "bob");

        registry.join_room(alice, "#one").unwrap();
        assert_eq!(
            registry.join_room(bob, "#two"),
            Err(ChatError::RoomLimitReached(1))
        );
        assert!(registry.join_room(bob, "#one").is_ok());
        registry.assert_consistent();
    }

    #[test]
    fn test_room_cap_counts_room_freed_by_move() {
        let mut registry = registry_with(10, 1);
        let (alice, _a) = connect(&mut registry, "alice");

        registry.join_room(alice, "#one").unwrap();
        assert!(registry.join_room(alice, "#two").is_ok());
        assert_eq!(registry.room_count(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn test_failed_join_keeps_current_room() {
        let mut registry = registry_with(10, 10);
        let (alice, _a) = connect(&mut registry, "alice");
        registry.join_room(alice, "#one").unwrap();

        assert!(matches!(
            registry.join_room(alice, "bad!room"),
            Err(ChatError::InvalidRoomName(_))
        ));
        assert_eq!(registry.session(alice).unwrap().room.as_deref(), Some("#one"));
        registry.assert_consistent();
    }

    #[test]
    fn test_list_members_in_join_order() {
        let mut registry = registry_with(10, 10);
        let (alice, _a) = connect(&mut registry, "alice");
        let (bob, _b) = connect(&mut registry, "bob");
        registry.join_room(bob, "#r").unwrap();
        registry.join_room(alice, "#r").unwrap();

        let names: Vec<String> = registry
            .list_members("#r")
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(names, vec!["bob", "alice"]);

        let recipients = registry.recipients("#r", Some(bob));
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].0, alice);
    }

    #[test]
    fn test_history_bound() {
        let mut registry = registry_with(10, 10);
        let (alice, _a) = connect(&mut registry, "alice");
        registry.join_room(alice, "#r").unwrap();

        for i in 0..150 {
            registry.append_history("#r", format!("msg {}", i));
        }
        let all = registry.recent_history("#r", 1000);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0], "msg 50");
        assert_eq!(all[99], "msg 149");
        registry.assert_consistent();
    }

    #[test]
    fn test_remove_is_idempotent_and_clears_state() {
        let mut registry = registry_with(10, 10);
        let (alice, _a) = connect(&mut registry, "alice");
        registry.join_room(alice, "#r").unwrap();
        registry.check_rate(alice).unwrap();
        registry.start_typing(alice);

        let departure = registry.remove(alice).unwrap();
        assert!(departure.was_typing);
        assert!(departure.room_closed);
        assert!(registry.remove(alice).is_none());
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.room_count(), 0);
        registry.assert_consistent();
    }

    #[test]
    fn test_typing_transitions_require_room() {
        let mut registry = registry_with(10, 10);
        let (alice, _a) = connect(&mut registry, "alice");

        assert!(registry.start_typing(alice).is_none());
        registry.join_room(alice, "#r").unwrap();
        assert_eq!(
            registry.start_typing(alice),
            Some(("#r".to_string(), "alice".to_string()))
        );
        assert!(registry.start_typing(alice).is_none());
        assert!(registry.stop_typing(alice).is_some());
        assert!(registry.stop_typing(alice).is_none());
    }

    #[test]
    fn test_room_listing_sorted() {
        let mut registry = registry_with(10, 10);
        let (alice, _a) = connect(&mut registry, "alice");
        let (bob, _b) = connect(&mut registry, "bob");
        registry.join_room(alice, "#zeta").unwrap();
        registry.join_room(bob, "#alpha").unwrap();

        let listing = registry.room_listing();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].room, "#alpha");
        assert_eq!(listing[1].room, "#zeta");
        assert_eq!(listing[1].members.len(), 1);
    }
}
