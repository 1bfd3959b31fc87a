//! Per-client connection loop.
//!
//! A client talks to DuraKV one line at a time. The handler owns the socket,
//! keeps unconsumed bytes in a `BytesMut`, and answers every complete line
//! before it reads again, so pipelined requests are answered in order.
//!
//! ```text
//!   socket ──read──> buffer ──LineParser──> Vec<String>
//!                                                │
//!                                     Command::parse + execute
//!                                                │
//!   socket <──write+flush── Reply::serialize <───┘
//! ```
//!
//! The loop ends when the client sends `quit`, closes its side, or a line
//! overruns the parser's limit. Malformed lines and unknown commands only
//! produce an error reply.

use crate::commands::{Command, CommandHandler};
use crate::protocol::{LineParser, ParseError, Reply};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Counters shared by every connection task.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Connections ever accepted
    pub connections_accepted: AtomicU64,
    /// Connections currently open
    pub active_connections: AtomicU64,
    /// Request lines answered, errors included
    pub commands_processed: AtomicU64,
    /// Request lines answered with an error reply
    pub request_errors: AtomicU64,
}

/// A point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub accepted: u64,
    pub active: u64,
    pub commands: u64,
    pub errors: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_reply(&self, reply: &Reply) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if reply.is_error() {
            self.request_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            accepted: self.connections_accepted.load(Ordering::Relaxed),
            active: self.active_connections.load(Ordering::Relaxed),
            commands: self.commands_processed.load(Ordering::Relaxed),
            errors: self.request_errors.load(Ordering::Relaxed),
        }
    }
}

/// What the main loop should do after a line.
enum Flow {
    Continue,
    Close,
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared store)
    command_handler: CommandHandler,

    /// Line framer
    parser: LineParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: LineParser::new(),
            stats,
        }
    }

    /// Runs the connection until the client leaves or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some((line, consumed)) = self.parser.parse(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(client = %self.addr, consumed, remaining = self.buffer.len(), "Parsed line");

                if let Flow::Close = self.handle_line(line).await? {
                    return Ok(());
                }
            }

            self.read_more_data().await?;
        }
    }

    /// Executes one request line and writes its reply.
    async fn handle_line(
        &mut self,
        line: Result<Vec<String>, ParseError>,
    ) -> Result<Flow, ConnectionError> {
        let (reply, flow) = match line {
            Ok(args) if args.is_empty() => return Ok(Flow::Continue),
            Ok(args) => match Command::parse(&args) {
                Ok(Command::Quit) => (Reply::ok(), Flow::Close),
                Ok(command) => (self.command_handler.execute(command), Flow::Continue),
                Err(e) => (Reply::error(e.to_string()), Flow::Continue),
            },
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Malformed request line");
                (Reply::error(e.to_string()), Flow::Continue)
            }
        };

        self.stats.record_reply(&reply);
        self.send_reply(&reply).await?;
        Ok(flow)
    }

    /// Pulls at least one more chunk from the socket.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    /// Sends a reply to the client.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), "Sent reply");
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    // Also runs when the task is aborted mid-request
    fn drop(&mut self) {
        self.stats.closed();
    }
}

/// Why a connection loop stopped.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Framing error that cannot be recovered from
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial line)
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

/// Serves one accepted client to completion.
///
/// Expected endings (peer closed, connection reset) are not reported.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Serves a fresh in-memory store on an ephemeral port.
    async fn create_test_server() -> (SocketAddr, Arc<Store>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new());
        let stats = Arc::new(ConnectionStats::new());

        let (server_store, server_stats) = (Arc::clone(&store), Arc::clone(&stats));
        tokio::spawn(async move {
            loop {
                let Ok((stream, peer)) = listener.accept().await else {
                    break;
                };
                let handler = CommandHandler::new(Arc::clone(&server_store));
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    handler,
                    Arc::clone(&server_stats),
                ));
            }
        });

        (addr, store, stats)
    }

    /// Sends `request` and reads `lines` reply lines.
    async fn exchange(
        client: &mut BufReader<TcpStream>,
        request: &str,
        lines: usize,
    ) -> Vec<String> {
        client.get_mut().write_all(request.as_bytes()).await.unwrap();

        let mut replies = Vec::with_capacity(lines);
        for _ in 0..lines {
            let mut line = String::new();
            tokio::time::timeout(Duration::from_secs(2), client.read_line(&mut line))
                .await
                .expect("timed out waiting for reply")
                .unwrap();
            replies.push(line.trim_end_matches('\n').to_string());
        }
        replies
    }

    async fn connect(addr: SocketAddr) -> BufReader<TcpStream> {
        BufReader::new(TcpStream::connect(addr).await.unwrap())
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;
        let mut client = connect(addr).await;

        assert_eq!(exchange(&mut client, "PING\r\n", 1).await, vec!["PONG"]);
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, store, _) = create_test_server().await;
        let mut client = connect(addr).await;

        assert_eq!(
            exchange(&mut client, "set name \"dura kv\"\n", 1).await,
            vec!["OK"]
        );
        assert_eq!(
            exchange(&mut client, "get name\n", 1).await,
            vec!["\"dura kv\""]
        );
        assert!(store.exists("name"));
    }

    #[tokio::test]
    async fn test_pipelined_lines() {
        let (addr, _, _) = create_test_server().await;
        let mut client = connect(addr).await;

        let replies = exchange(
            &mut client,
            "set k1 v1\nset k2 v2\nkeys\nttl k1\nttl nope\n",
            7,
        )
        .await;

        assert_eq!(
            replies,
            vec![
                "OK",
                "OK",
                "(array) 2",
                "\"k1\"",
                "\"k2\"",
                "Key exists but has no expiration.",
                "Key does not exist.",
            ]
        );
    }

    #[tokio::test]
    async fn test_errors_keep_connection_open() {
        let (addr, _, _) = create_test_server().await;
        let mut client = connect(addr).await;

        let replies = exchange(&mut client, "fly\nset k \"open\n\nping\n", 3).await;

        assert_eq!(replies[0], "(error) unknown command 'fly'");
        assert_eq!(replies[1], "(error) unbalanced quotes in request");
        assert_eq!(replies[2], "PONG");
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let (addr, _, stats) = create_test_server().await;
        let mut client = connect(addr).await;

        assert_eq!(exchange(&mut client, "quit\n", 1).await, vec!["OK"]);

        let mut rest = String::new();
        let n = client.read_line(&mut rest).await.unwrap();
        assert_eq!(n, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.summary().active, 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;
        assert_eq!(stats.summary().active, 0);

        let mut client = connect(addr).await;
        exchange(&mut client, "ping\nget\nget k\n", 3).await;

        let summary = stats.summary();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.commands, 3);
        assert_eq!(summary.errors, 1);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.summary().active, 0);
    }
}
