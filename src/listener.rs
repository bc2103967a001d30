//! TCP listener and server lifecycle
//!
//! Binds the socket, starts the ChatServer actor and the accept loop, and
//! hands back a `ServerHandle` for graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, wait_for_shutdown};
use crate::server::{ChatServer, ServerCommand};

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Pause before retrying after a failed accept
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Handle to a running server
///
/// Dropping the handle without calling `shutdown` also stops the accept
/// loop and ends every connection.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    cmd_tx: mpsc::Sender<ServerCommand>,
    accept_task: JoinHandle<()>,
    actor_task: JoinHandle<()>,
}

/// Bind the listener and start serving
///
/// Bind failures are returned; everything after that runs in the background.
pub async fn start_server(config: ServerConfig) -> Result<ServerHandle, AppError> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!("Tempest server listening on {}", local_addr);

    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let actor_task = tokio::spawn(ChatServer::new(cmd_rx, config.clone()).run());
    let accept_task = tokio::spawn(accept_loop(
        listener,
        cmd_tx.clone(),
        Arc::new(config),
        shutdown_rx,
    ));

    Ok(ServerHandle {
        local_addr,
        shutdown_tx,
        cmd_tx,
        accept_task,
        actor_task,
    })
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every session and wait for the actor to exit
    pub async fn shutdown(self) {
        info!("Server shutdown requested");
        let _ = self.shutdown_tx.send(true);
        let _ = self.accept_task.await;
        let _ = self.cmd_tx.send(ServerCommand::Shutdown).await;
        let _ = self.actor_task.await;
        info!("Server stopped");
    }
}

/// Accept connections until shutdown, one task per connection
async fn accept_loop(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<ServerConfig>,
    shutdown: watch::Receiver<bool>,
) {
    let mut stop = shutdown.clone();

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut stop) => {
                info!("No longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let cmd_tx = cmd_tx.clone();
                        let config = config.clone();
                        let shutdown = shutdown.clone();

                        // Spawn handler task for each connection
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, cmd_tx, config, shutdown).await {
                                error!("Connection handler error for {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                }
            }
        }
    }
}
