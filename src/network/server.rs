//! TCP Game Server
//!
//! Accepts connections, reads newline-terminated commands and hands them to
//! the room registry. Each connection gets a writer task fed by a bounded
//! channel, so a slow client only ever loses its own lines.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::network::protocol::{ClientMessage, ServerMessage, MAX_LINE_BYTES};
use crate::network::registry::{ClientId, RoomRegistry};
use crate::network::room::{send, RoomConfig};

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Rooms and connected clients.
    registry: Arc<RoomRegistry>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let room_config = config.room_config();
        Self::with_room_config(config, room_config)
    }

    /// Create a server with explicit room settings.
    pub fn with_room_config(config: ServerConfig, room_config: RoomConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry: Arc::new(RoomRegistry::new(room_config)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.run_with_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.registry.client_count().await >= self.config.max_connections {
                                warn!("{}, rejecting {}", GameServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.registry.shutdown().await;
        Ok(())
    }

    /// Handle a new TCP connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let queue = self.config.outbound_queue;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("set_nodelay failed for {}: {}", addr, e);
            }
            let (read_half, mut write_half) = stream.into_split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(queue);

            let client_id = registry.connect(msg_tx.clone(), addr).await;

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let mut line = msg.to_string();
                    line.push('\n');
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });

            let mut reader = BufReader::new(read_half);
            let mut buf = Vec::with_capacity(256);

            // Handle incoming lines
            loop {
                tokio::select! {
                    line = read_line(&mut reader, &mut buf) => {
                        match line {
                            Ok(Some(Line::Text(text))) => {
                                Self::handle_line(&registry, client_id, addr, &text, &msg_tx).await;
                            }
                            Ok(Some(Line::TooLong)) => {
                                warn!("Dropping over-long line from {}", addr);
                            }
                            Ok(None) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Err(e) => {
                                debug!("Read error for {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            registry.disconnect(client_id).await;
            sender_task.abort();
            info!("Client {} cleaned up", addr);
        });
    }

    /// Parse and apply one line.
    async fn handle_line(
        registry: &RoomRegistry,
        client_id: ClientId,
        addr: SocketAddr,
        text: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let msg: ClientMessage = match text.parse() {
            Ok(m) => m,
            Err(e) => {
                debug!("Invalid message from {}: {}", addr, e);
                return;
            }
        };

        if let Err(e) = registry.dispatch(client_id, msg).await {
            match e.client_reason() {
                Some(reason) => send(sender, ServerMessage::Error(reason.to_string())),
                None => debug!("Ignored command from {}: {}", addr, e),
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.registry.client_count().await
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }

    /// The room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}

/// One read from a connection.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Text(String),
    TooLong,
}

/// Read one `\n`-terminated line, never buffering more than
/// `MAX_LINE_BYTES`. An over-long line is consumed and reported as
/// `TooLong`. `None` means EOF.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<Line>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = MAX_LINE_BYTES as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(None);
    }

    let terminated = buf.last() == Some(&b'\n');
    if terminated || n <= MAX_LINE_BYTES {
        return Ok(Some(Line::Text(String::from_utf8_lossy(buf).into_owned())));
    }

    // Skip the rest of the oversized line
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(None);
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(Some(Line::TooLong));
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(local_config());
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(GameServer::new(local_config()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let runner = server.clone();
        let handle = tokio::spawn(async move { runner.run_with_listener(listener).await });
        tokio::task::yield_now().await;

        server.shutdown();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_read_line() {
        let input: &[u8] = b"START_GAME\nINPUT;UP;true\r\nlast";
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), Some(Line::Text("START_GAME\n".into())));
        assert_eq!(
            read_line(&mut reader, &mut buf).await.unwrap(),
            Some(Line::Text("INPUT;UP;true\r\n".into()))
        );
        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), Some(Line::Text("last".into())));
        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_drops_oversized() {
        let mut input = vec![b'x'; MAX_LINE_BYTES * 3];
        input.extend_from_slice(b"\nPLACE_BOMB\n");
        let mut reader = BufReader::with_capacity(64, input.as_slice());
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), Some(Line::TooLong));
        assert_eq!(read_line(&mut reader, &mut buf).await.unwrap(), Some(Line::Text("PLACE_BOMB\n".into())));
    }
}
