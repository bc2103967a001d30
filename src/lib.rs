//! Tempest multi-room chat server library
//!
//! A line-oriented TCP chat server built with tokio using the Actor
//! pattern for state management.
//!
//! # Features
//! - Nickname identification with decorative avatars
//! - Named rooms created on first join, removed when the last member leaves
//! - Bounded per-room history, replayed to new members
//! - Per-session chat rate limiting
//! - Typing indicators
//! - Idle-connection timeout and graceful shutdown
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the `Registry`
//! - Each connection has a `handler` task forwarding lines to the server
//! - No locks needed - every command runs to completion inside the actor
//!
//! # Example
//! ```ignore
//! use tempest_server::{start_server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = start_server(ServerConfig::default()).await.unwrap();
//!     println!("listening on {}", server.local_addr());
//!
//!     tokio::signal::ctrl_c().await.unwrap();
//!     server.shutdown().await;
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod rate_limit;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod typing;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{AppError, ChatError, SendError};
pub use handler::handle_connection;
pub use listener::{start_server, ServerHandle};
pub use message::{ClientCommand, ServerMessage};
pub use registry::Registry;
pub use room::Room;
pub use server::{ChatServer, ServerCommand};
pub use session::{Session, SessionState};
pub use types::{Avatar, ClientId};
