//! Accept loop with graceful shutdown.
//!
//! [`Server::run_until`] accepts clients until the shutdown future resolves,
//! then closes the listener and gives open connections a grace period to
//! finish. Connections still open after that are aborted. When it returns, no
//! connection task is left that could touch the store, so a snapshot taken
//! afterwards is final.

use crate::commands::CommandHandler;
use crate::connection::handler::{handle_connection, ConnectionStats};
use crate::storage::Store;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Default time open connections get to finish after shutdown starts.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Serves the store on a bound listener.
pub struct Server {
    listener: TcpListener,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
    connections: JoinSet<()>,
}

impl Server {
    pub fn new(listener: TcpListener, store: Arc<Store>, stats: Arc<ConnectionStats>) -> Self {
        Self {
            listener,
            store,
            stats,
            connections: JoinSet::new(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until `shutdown` resolves, then drains connections.
    pub async fn run_until<F>(mut self, shutdown: F, grace: Duration)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => self.handle_accept(accepted),
                Some(finished) = self.connections.join_next(), if !self.connections.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Connection task ended abnormally");
                    }
                }
            }
        }

        let Server {
            listener,
            mut connections,
            ..
        } = self;
        drop(listener);

        info!(open = connections.len(), "Stopped accepting, draining connections");
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            info!(open = connections.len(), "Grace period over, closing connections");
            connections.shutdown().await;
        }
    }

    fn handle_accept(&mut self, accepted: std::io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, addr)) => {
                debug!(client = %addr, "Accepted connection");
                let handler = CommandHandler::new(Arc::clone(&self.store));
                self.connections.spawn(handle_connection(
                    stream,
                    addr,
                    handler,
                    Arc::clone(&self.stats),
                ));
            }
            Err(e) => error!(error = %e, "Failed to accept connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct Running {
        addr: SocketAddr,
        store: Arc<Store>,
        stats: Arc<ConnectionStats>,
        stop_tx: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    }

    async fn start(grace: Duration) -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let store = Arc::new(Store::new());
        let stats = Arc::new(ConnectionStats::new());
        let server = Server::new(listener, Arc::clone(&store), Arc::clone(&stats));
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(
            async {
                let _ = stop_rx.await;
            },
            grace,
        ));

        Running {
            addr,
            store,
            stats,
            stop_tx,
            handle,
        }
    }

    async fn request(client: &mut BufReader<TcpStream>, line: &str) -> String {
        client.get_mut().write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        client.read_line(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_no_writes_after_shutdown_returns() {
        let Running {
            addr,
            store,
            stats,
            stop_tx,
            handle,
        } = start(Duration::from_millis(100)).await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(request(&mut client, "set early v\n").await, "OK\n");

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap();

        // The idle connection was closed when the grace period ran out
        let _ = client.get_mut().write_all(b"set late v\n").await;
        let mut rest = String::new();
        let n = client.read_line(&mut rest).await.unwrap_or(0);
        assert_eq!(n, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.exists("early"));
        assert!(!store.exists("late"));
        assert_eq!(stats.summary().active, 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_clients_that_leave() {
        let Running {
            addr,
            store,
            stop_tx,
            handle,
            ..
        } = start(Duration::from_secs(5)).await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(request(&mut client, "set k v\n").await, "OK\n");

        stop_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Still served during the grace period
        assert_eq!(request(&mut client, "append k w\n").await, "(integer) 2\n");
        assert_eq!(request(&mut client, "quit\n").await, "OK\n");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("server kept waiting after the last client left")
            .unwrap();
        assert_eq!(store.get("k"), Some(crate::storage::Value::from("vw")));
    }

    #[tokio::test]
    async fn test_listener_closed_after_shutdown() {
        let Running {
            addr,
            stop_tx,
            handle,
            ..
        } = start(Duration::from_millis(50)).await;

        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
