//! Room fan-out
//!
//! Delivers one line to a snapshot of a room's members, in join order.
//! Delivery never waits: a member whose channel is closed or whose
//! outbound queue is full is reported back so the caller can remove it
//! from the registry.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::message::ServerMessage;
use crate::registry::Recipient;
use crate::types::ClientId;

/// Send `msg` to every recipient, returning the ones that could not be reached
pub fn broadcast(recipients: Vec<Recipient>, msg: &ServerMessage) -> Vec<ClientId> {
    let mut failed = Vec::new();

    for (client_id, sender) in recipients {
        match sender.try_send(msg.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue of {} is full, dropping session", client_id);
                failed.push(client_id);
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Broadcast to {} failed, dropping session", client_id);
                failed.push(client_id);
            }
        }
    }

    if !failed.is_empty() {
        debug!("{} recipient(s) unreachable", failed.len());
    }
    failed
}
