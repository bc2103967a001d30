//! Line connection handler
//!
//! Handles individual client connections: line framing, idle timeout,
//! and bidirectional communication with the ChatServer.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Hard cap on one raw input frame; the rest of a longer line is discarded
pub const MAX_FRAME_BYTES: usize = 4096;

/// How long queued replies may take to flush once a connection is ending
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle one accepted connection
///
/// Works on any duplex byte stream. Registers with the ChatServer, forwards
/// every input line, and reports the disconnect when the read side ends,
/// the write side fails, the idle timeout expires or shutdown is signalled.
pub async fn handle_connection<S>(
    stream: S,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let client_id = ClientId::new();
    let (read_half, write_half) = tokio::io::split(stream);

    // Server -> client lines
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);

    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        warn!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    let mut write_task = tokio::spawn(write_loop(write_half, msg_rx, client_id));
    let mut writer_done = false;
    let mut reader = BufReader::new(read_half);

    let result = tokio::select! {
        result = read_loop(&mut reader, client_id, &cmd_tx, config.idle_timeout()) => result,
        _ = &mut write_task => {
            debug!("Write side of {} closed", client_id);
            writer_done = true;
            Ok(())
        }
        _ = wait_for_shutdown(&mut shutdown) => {
            debug!("Shutdown signalled, closing {}", client_id);
            Ok(())
        }
    };

    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    // Let queued replies (e.g. GOODBYE) reach the client before closing
    if !writer_done {
        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut write_task).await {
            Ok(_) => {}
            Err(_) => {
                debug!("Writer for {} did not drain in time", client_id);
                write_task.abort();
            }
        }
    }

    info!("Client {} disconnected", client_id);
    result
}

/// Resolve once shutdown is signalled or the signalling side is gone
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Forward input lines to the ChatServer until EOF, error or idle timeout
async fn read_loop<R>(
    reader: &mut R,
    client_id: ClientId,
    cmd_tx: &mpsc::Sender<ServerCommand>,
    idle_timeout: Duration,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        let frame = match tokio::time::timeout(idle_timeout, read_frame(reader, &mut buf)).await {
            Ok(frame) => frame?,
            Err(_) => {
                info!("Client {} idle for {:?}, disconnecting", client_id, idle_timeout);
                return Ok(());
            }
        };

        let Some(line) = frame else {
            debug!("Client {} closed the connection", client_id);
            return Ok(());
        };
        if line.is_empty() {
            continue;
        }

        cmd_tx
            .send(ServerCommand::Line { client_id, line })
            .await
            .map_err(|_| AppError::ChannelSend)?;
    }
}

/// Read one newline-terminated frame, trimmed. `None` on EOF.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_FRAME_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if read == MAX_FRAME_BYTES && buf.last() != Some(&b'\n') {
        discard_line(reader).await?;
    }
    Ok(Some(String::from_utf8_lossy(buf).trim().to_string()))
}

/// Skip input up to and including the next newline
async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = available.len();
        reader.consume(len);
    }
}

/// Drain the outbound channel onto the socket, one line per message
async fn write_loop<W>(mut writer: W, mut msg_rx: mpsc::Receiver<ServerMessage>, client_id: ClientId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = msg_rx.recv().await {
        let line = format!("{}\n", msg);
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("Write to {} failed: {}", client_id, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
    debug!("Write task ended for {}", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ChatServer;
    use tokio::io::{DuplexStream, Lines};

    struct TestConn {
        lines: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl TestConn {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out waiting for line")
                .unwrap()
        }

        async fn recv_until(&mut self, pred: impl Fn(&str) -> bool) -> String {
            loop {
                let line = self.recv().await.expect("connection closed");
                if pred(&line) {
                    return line;
                }
            }
        }
    }

    fn start(config: ServerConfig) -> (mpsc::Sender<ServerCommand>, watch::Sender<bool>, Arc<ServerConfig>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(cmd_rx, config.clone()).run());
        let (shutdown_tx, _) = watch::channel(false);
        (cmd_tx, shutdown_tx, Arc::new(config))
    }

    fn open(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        shutdown: &watch::Sender<bool>,
        config: &Arc<ServerConfig>,
    ) -> (TestConn, tokio::task::JoinHandle<Result<(), AppError>>) {
        open_with_capacity(cmd_tx, shutdown, config, 64 * 1024)
    }

    fn open_with_capacity(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        shutdown: &watch::Sender<bool>,
        config: &Arc<ServerConfig>,
        capacity: usize,
    ) -> (TestConn, tokio::task::JoinHandle<Result<(), AppError>>) {
        let (client, server) = tokio::io::duplex(capacity);
        let task = tokio::spawn(handle_connection(
            server,
            cmd_tx.clone(),
            config.clone(),
            shutdown.subscribe(),
        ));
        let (read, writer) = tokio::io::split(client);
        let conn = TestConn {
            lines: BufReader::new(read).lines(),
            writer,
        };
        (conn, task)
    }

    #[tokio::test]
    async fn test_greeting_and_bye_closes() {
        let (cmd_tx, shutdown, config) = start(ServerConfig::default());
        let (mut conn, task) = open(&cmd_tx, &shutdown, &config);

        assert_eq!(
            conn.recv().await.unwrap(),
            "Welcome to Tempest Server! Use /connect <name> to begin."
        );
        conn.send("/bye").await;
        assert_eq!(conn.recv().await.unwrap(), "GOODBYE");
        assert_eq!(conn.recv().await, None);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_crlf_and_blank_lines() {
        let (cmd_tx, shutdown, config) = start(ServerConfig::default());
        let (mut conn, _task) = open(&cmd_tx, &shutdown, &config);
        conn.recv().await;

        conn.writer.write_all(b"\r\n\n/connect alice\r\n").await.unwrap();
        assert!(conn.recv().await.unwrap().starts_with("WELCOME alice ["));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_and_skipped() {
        let (cmd_tx, shutdown, config) = start(ServerConfig::default());
        let (mut conn, _task) = open(&cmd_tx, &shutdown, &config);
        conn.recv().await;

        conn.send(&"x".repeat(MAX_FRAME_BYTES * 2)).await;
        conn.send("/dance").await;
        assert_eq!(
            conn.recv().await.unwrap(),
            "Error: Message too long (max 500 characters)"
        );
        assert_eq!(
            conn.recv().await.unwrap(),
            "Unknown command. Type /help for available commands."
        );
    }

    #[tokio::test]
    async fn test_idle_timeout_disconnects() {
        let (cmd_tx, shutdown, config) = start(ServerConfig {
            idle_timeout_secs: 1,
            ..ServerConfig::default()
        });
        let (mut conn, task) = open(&cmd_tx, &shutdown, &config);
        conn.recv().await;

        assert_eq!(conn.recv().await, None);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_connection() {
        let (cmd_tx, shutdown, config) = start(ServerConfig::default());
        let (mut conn, task) = open(&cmd_tx, &shutdown, &config);
        conn.recv().await;

        shutdown.send(true).unwrap();
        assert_eq!(conn.recv().await, None);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_peer_close_notifies_room() {
        let (cmd_tx, shutdown, config) = start(ServerConfig::default());
        let (mut alice, _a) = open(&cmd_tx, &shutdown, &config);
        let (mut bob, bob_task) = open(&cmd_tx, &shutdown, &config);
        alice.recv().await;
        bob.recv().await;

        alice.send("/connect alice").await;
        alice.recv().await;
        alice.recv().await;
        alice.send("/room #r").await;
        assert_eq!(alice.recv().await.unwrap(), "ENTERED #r");
        alice.recv().await;

        bob.send("/connect bob").await;
        bob.recv().await;
        bob.recv().await;
        bob.send("/room #r").await;
        bob.recv().await;
        let joined = alice.recv().await.unwrap();
        assert!(joined.ends_with("bob has entered the room **"));

        drop(bob);
        assert!(bob_task.await.unwrap().is_ok());
        let left = alice.recv().await.unwrap();
        assert!(left.ends_with("bob has left the room **"));
    }

    #[tokio::test]
    async fn test_stalled_reader_is_dropped_without_blocking_others() {
        let (cmd_tx, shutdown, config) = start(ServerConfig {
            outbound_buffer: 4,
            rate_limit_messages: 1000,
            ..ServerConfig::default()
        });

        // alice joins, then stops reading; her socket buffer is tiny
        let (mut alice, _a) = open_with_capacity(&cmd_tx, &shutdown, &config, 64);
        alice.recv().await;
        alice.send("/connect alice").await;
        alice.recv_until(|l| l.starts_with("No active rooms")).await;
        alice.send("/room #r").await;
        alice.recv_until(|l| l.ends_with("alice has entered the room **")).await;

        let (mut bob, _b) = open(&cmd_tx, &shutdown, &config);
        bob.recv().await;
        bob.send("/connect bob").await;
        bob.recv_until(|l| l.starts_with("WELCOME bob")).await;
        bob.send("/room #r").await;
        bob.recv_until(|l| l.ends_with("bob has entered the room **")).await;

        for i in 0..100 {
            bob.send(&format!("line {}", i)).await;
            let echo = format!("bob: line {}", i);
            bob.recv_until(|l| l.ends_with(&echo)).await;
        }

        // An unrelated session is still served
        let (mut carol, _c) = open(&cmd_tx, &shutdown, &config);
        carol.recv().await;
        carol.send("/connect carol").await;
        carol.recv_until(|l| l.starts_with("WELCOME carol")).await;
        carol.send("/who").await;
        carol.recv_until(|l| l == "You must join a room first.").await;

        // alice was dropped from the room
        bob.send("/who").await;
        let users = bob.recv_until(|l| l.starts_with("USERS:")).await;
        assert!(users.ends_with("] bob"), "unexpected listing: {}", users);
        assert!(!users.contains("alice"));
    }
}
