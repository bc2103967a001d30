//! Typing indicator state
//!
//! The client decides when typing starts and stops; the server only
//! records the flag and reports real transitions so peers never see
//! duplicate indicators.

use std::collections::HashSet;

use crate::types::ClientId;

/// Sessions currently flagged as typing
#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: HashSet<ClientId>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a client as typing.
    ///
    /// Returns true only on a not-typing → typing transition.
    pub fn start(&mut self, client_id: ClientId) -> bool {
        self.typing.insert(client_id)
    }

    /// Mark a client as no longer typing.
    ///
    /// Returns true only on a typing → not-typing transition.
    pub fn stop(&mut self, client_id: ClientId) -> bool {
        self.typing.remove(&client_id)
    }

    /// Drop all state for a client. Returns whether it was typing.
    pub fn remove(&mut self, client_id: ClientId) -> bool {
        self.stop(client_id)
    }

    pub fn tracked(&self) -> usize {
        self.typing.len()
    }
}
