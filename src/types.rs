//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique connection identifier
//! - `Avatar`: decorative glyph handed out at identification

use rand::seq::SliceRandom;
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe connection identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Glyphs an avatar is drawn from. Non-emoji so every terminal renders them.
pub const AVATAR_PALETTE: &[char] = &[
    '♠', '♣', '♥', '♦', '♪', '♫', '♯', '♭', '†', '‡', '§', '¶', '©', '®', '™', '←', '→', '↑',
    '↓', '↔', '↕', '↖', '↗', '↘', '↙', '∞', '∆', '∇', '∑', '∏', '√', '∴', '∵', '∀', '∃', '∈',
    '∋', '⊂', '⊃', '⊆', '⊇', '⊕', '⊗', '⊙', '⊥', '☐', '☑', '☒', '☓', '☆', '★', '☽', '☾', '⚡',
    '⚐', '⚑', '⚒', '⚓', '⚔', '⚖',
];

/// Cosmetic avatar glyph shown next to a nickname
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Avatar(pub char);

impl Avatar {
    /// Pick a random glyph from the palette
    pub fn random() -> Self {
        let glyph = AVATAR_PALETTE
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or('*');
        Self(glyph)
    }
}

impl std::fmt::Display for Avatar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
