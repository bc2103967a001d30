//! Rate limiting for chat message spam prevention.
//!
//! Fixed window per session: the first message opens a window, at most
//! `max_messages` are accepted until the window length has elapsed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::ChatError;
use crate::types::ClientId;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

/// Per-session message rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_messages: u32,
    window: Duration,
    windows: HashMap<ClientId, RateWindow>,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            max_messages,
            window,
            windows: HashMap::new(),
        }
    }

    /// Check whether a client may send a message right now
    pub fn check(&mut self, client_id: ClientId) -> Result<(), ChatError> {
        self.check_at(client_id, Instant::now())
    }

    /// Check against an explicit clock reading.
    ///
    /// A rejection leaves the window untouched.
    pub fn check_at(&mut self, client_id: ClientId, now: Instant) -> Result<(), ChatError> {
        let fresh = RateWindow {
            started_at: now,
            count: 1,
        };

        let Some(window) = self.windows.get_mut(&client_id) else {
            self.windows.insert(client_id, fresh);
            return Ok(());
        };

        if now.saturating_duration_since(window.started_at) >= self.window {
            *window = fresh;
            return Ok(());
        }

        if window.count < self.max_messages {
            window.count += 1;
            return Ok(());
        }

        warn!("Client {} exceeded rate limit", client_id);
        Err(ChatError::RateLimited)
    }

    /// Forget a client's window (on disconnect)
    pub fn remove(&mut self, client_id: ClientId) {
        self.windows.remove(&client_id);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
