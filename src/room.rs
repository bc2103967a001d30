//! Room struct definition
//!
//! Represents a named chat room with ordered membership and bounded history.

use std::collections::VecDeque;
use std::time::Instant;

use crate::types::ClientId;

/// Named chat room
///
/// Members are kept in join order, which is also the fan-out order.
/// History is a FIFO capped at `history_limit` lines.
#[derive(Debug)]
pub struct Room {
    /// Room name as sanitized on join
    pub name: String,
    /// Members in insertion order
    members: Vec<ClientId>,
    /// Formatted chat lines, oldest first
    history: VecDeque<String>,
    /// History capacity
    history_limit: usize,
    /// Room creation time
    pub created_at: Instant,
}

impl Room {
    /// Create an empty room
    pub fn new(name: String, history_limit: usize) -> Self {
        Self {
            name,
            members: Vec::new(),
            history: VecDeque::with_capacity(history_limit),
            history_limit,
            created_at: Instant::now(),
        }
    }

    /// Add a member at the end of the listing order
    ///
    /// Returns false if the client is already a member.
    pub fn add_member(&mut self, client_id: ClientId) -> bool {
        if self.contains(client_id) {
            return false;
        }
        self.members.push(client_id);
        true
    }

    /// Remove a member
    ///
    /// Returns true if the room should be deleted (no members left).
    pub fn remove_member(&mut self, client_id: ClientId) -> bool {
        self.members.retain(|id| *id != client_id);
        self.members.is_empty()
    }

    /// Check if a client is in this room
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    pub fn members(&self) -> &[ClientId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append a history line, evicting the oldest past the cap
    pub fn push_history(&mut self, line: String) {
        self.history.push_back(line);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// The last `count` history lines, oldest first
    pub fn recent_history(&self, count: usize) -> Vec<String> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
