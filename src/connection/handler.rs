//! Per-client connection loop.
//!
//! TCP is a byte stream, so a single read may carry half a command or a
//! pipeline of many. Each connection owns a `BytesMut` accumulation
//! buffer: the loop drains every complete frame it holds, executes them in
//! order, and only then reads more bytes. Replies go through a buffered
//! writer and are flushed once per batch of parsed commands.

use crate::commands::CommandHandler;
use crate::protocol::{parse_frame, ParseError, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Cap on buffered-but-unparsed request bytes per connection (64 KB).
const MAX_BUFFER: usize = 64 * 1024;

const INITIAL_BUFFER: usize = 4 * 1024;

/// Server-wide connection counters, shared across all client tasks.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub accepted: AtomicU64,
    pub active: AtomicU64,
    pub commands: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Why a connection loop ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Clean close from the client side.
    #[error("client disconnected")]
    Disconnected,

    /// The stream ended in the middle of a frame.
    #[error("connection closed mid-command")]
    TruncatedCommand,

    /// The client buffered more than [`MAX_BUFFER`] unparsed bytes.
    #[error("request buffer limit exceeded")]
    BufferFull,
}

/// State for one client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER),
            commands,
            stats,
        }
    }

    /// Runs the read-parse-execute-reply loop until the client leaves or
    /// errors out.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let outcome = self.serve().await;
        match &outcome {
            Ok(()) | Err(ConnectionError::Disconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection ended with error"),
        }

        self.stats.closed();
        outcome
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(request) = self.next_frame()? {
                let reply = self.commands.execute(request).await;
                self.stats.commands.fetch_add(1, Ordering::Relaxed);
                self.stream.write_all(&reply.encode()).await?;
            }
            self.stream.flush().await?;
            self.fill_buffer().await?;
        }
    }

    /// Pops one complete frame off the buffer, if one is there.
    fn next_frame(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match parse_frame(&self.buffer)? {
            Some((frame, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER {
            return Err(ConnectionError::BufferFull);
        }

        let read = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if read == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::Disconnected)
            } else {
                Err(ConnectionError::TruncatedCommand)
            };
        }
        Ok(())
    }
}

/// Spawn-friendly wrapper: build a handler, run it, log unusual endings.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, stats);
    match handler.run().await {
        Ok(()) | Err(ConnectionError::Disconnected) => {}
        Err(ConnectionError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        Err(e) => info!(client = %addr, error = %e, "Connection closed abnormally"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Keyspace;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn test_server() -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let keyspace = Arc::new(Keyspace::new());
        let stats = Arc::new(ConnectionStats::new());
        let stats_for_server = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let commands = CommandHandler::new(Arc::clone(&keyspace), None);
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    commands,
                    Arc::clone(&stats_for_server),
                ));
            }
        });

        (addr, stats)
    }

    #[tokio::test]
    async fn ping_pong() {
        let (addr, _) = test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn set_then_get() {
        let (addr, _) = test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nflare\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$5\r\nflare\r\n");
    }

    #[tokio::test]
    async fn pipelined_commands() {
        let (addr, _) = test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(
                b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
                  *3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n\
                  *2\r\n$3\r\nGET\r\n$1\r\na\r\n",
            )
            .await
            .unwrap();

        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        while collected.len() < 16 {
            let n = client.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(&collected[..], b"+OK\r\n+OK\r\n$1\r\n1\r\n");
    }

    #[tokio::test]
    async fn inline_command() {
        let (addr, _) = test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"PING\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn stats_track_connections() {
        let (addr, stats) = test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();

        assert_eq!(stats.accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active.load(Ordering::Relaxed), 1);
        assert!(stats.commands.load(Ordering::Relaxed) >= 1);

        drop(client);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn unknown_command_keeps_connection_open() {
        let (addr, _) = test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$3\r\nGTE\r\n").await.unwrap();
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"-ERR unknown command"));

        // The connection survives the error reply.
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }
}
