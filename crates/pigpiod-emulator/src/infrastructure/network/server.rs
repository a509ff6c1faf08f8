//! EmulatorServer: listening socket, connection pairing and session table.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener.
//! 2. Accepting connections in pairs: the first of a pair becomes the client's
//!    primary (command) channel, the second its notification channel.
//! 3. Greeting the notification connection and spawning one
//!    [`ClientSession`] task per pair, with increasing session ids.
//! 4. Stopping cleanly: once the shutdown flag clears, the accept loop exits at
//!    its next poll, every live session is told to close, and the server waits
//!    for each session task before dropping the listener.
//!
//! # Pairing (for beginners)
//!
//! The pigpio client library always connects twice, back to back.  There is
//! no field in either connection saying which is which, so the server relies
//! on order alone:
//!
//! ```text
//!  accept #1 ──► primary        ┐
//!  accept #2 ──► notification   ┘ session 0
//!  accept #3 ──► primary        ┐
//!  accept #4 ──► notification   ┘ session 1
//! ```
//!
//! A client that opens only one connection leaves the server waiting for the
//! second one.  Shutdown still works while waiting.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use pigpio_core::{encode_greeting, PortRegistry};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::infrastructure::network::session::ClientSession;

/// Default interval at which the accept loop re-checks the shutdown flag.
pub const DEFAULT_ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Errors from setting up the listening socket.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Cloneable handle that asks a running server (and its peer bridges) to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// A handle in the running state.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Requests shutdown.  Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Completes once [`stop`](Self::stop) has been called, checking every
    /// `poll`.
    pub async fn stopped(&self, poll: Duration) {
        while self.is_running() {
            tokio::time::sleep(poll).await;
        }
    }
}

/// A tracked session task.
struct SessionEntry {
    id: u64,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// The pigpiod-compatible TCP server.
pub struct EmulatorServer {
    listener: TcpListener,
    registry: Arc<PortRegistry>,
    shutdown: ShutdownHandle,
    accept_poll: Duration,
    next_session_id: u64,
}

impl EmulatorServer {
    /// Binds the listening socket.  Serving starts with [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is in use or not permitted.
    pub async fn bind(addr: SocketAddr, registry: Arc<PortRegistry>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            registry,
            shutdown: ShutdownHandle::new(),
            accept_poll: DEFAULT_ACCEPT_POLL,
            next_session_id: 0,
        })
    }

    /// Overrides how often the accept loop checks for shutdown.
    pub fn with_accept_poll(mut self, accept_poll: Duration) -> Self {
        self.accept_poll = accept_poll;
        self
    }

    /// The address actually bound (useful after binding port 0).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LocalAddr`] if the OS cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// A handle whose [`ShutdownHandle::stop`] ends [`run`](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accepts connection pairs until shutdown is requested, then closes every
    /// session and waits for them to finish.
    pub async fn run(mut self) {
        let local = self
            .listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        info!(
            "pigpiod emulator listening on {local} with {} virtual port(s)",
            self.registry.len()
        );

        let mut sessions: Vec<SessionEntry> = Vec::new();

        while self.shutdown.is_running() {
            let Some((primary, peer_addr)) = self.accept_one().await else {
                continue;
            };
            debug!("primary connection from {peer_addr}, waiting for notification connection");

            let Some((mut notification, notification_addr)) = self.accept_pair_member().await
            else {
                info!("shutdown while waiting for the notification connection of {peer_addr}");
                break;
            };

            if let Err(e) = notification.write_all(&encode_greeting()).await {
                warn!("greeting to notification connection {notification_addr} failed: {e}");
            }

            let id = self.next_session_id;
            self.next_session_id += 1;
            info!("session {id}: primary {peer_addr}, notification {notification_addr}");

            sessions.retain(|s| !s.task.is_finished());

            let shutdown = Arc::new(Notify::new());
            let session = ClientSession::new(
                id,
                primary,
                notification,
                Arc::clone(&self.registry),
                Arc::clone(&shutdown),
            );
            let task = tokio::spawn(session.run());
            sessions.push(SessionEntry { id, shutdown, task });
        }

        info!("shutdown flag set; stopping accept loop");

        for session in &sessions {
            session.shutdown.notify_one();
        }
        for session in sessions {
            if let Err(e) = session.task.await {
                error!("session {} task failed: {e}", session.id);
            }
        }

        info!("pigpiod emulator on {local} stopped");
    }

    /// One accept attempt bounded by the poll interval.
    ///
    /// Returns `None` on timeout or on a transient accept error so the caller
    /// can re-check the shutdown flag.
    async fn accept_one(&self) -> Option<(TcpStream, SocketAddr)> {
        match timeout(self.accept_poll, self.listener.accept()).await {
            Ok(Ok(accepted)) => Some(accepted),
            Ok(Err(e)) => {
                error!("accept error: {e}");
                None
            }
            Err(_) => None,
        }
    }

    /// Waits for the second connection of a pair, or `None` on shutdown.
    async fn accept_pair_member(&self) -> Option<(TcpStream, SocketAddr)> {
        while self.shutdown.is_running() {
            if let Some(accepted) = self.accept_one().await {
                return Some(accepted);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn make_server() -> EmulatorServer {
        let mut registry = PortRegistry::new();
        registry.register("/dev/ttyAMA0", 115_200).unwrap();
        EmulatorServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(registry))
            .await
            .unwrap()
            .with_accept_poll(Duration::from_millis(20))
    }

    #[test]
    fn test_shutdown_handle_clones_share_state() {
        // Arrange
        let handle = ShutdownHandle::new();
        let clone = handle.clone();

        // Act
        clone.stop();

        // Assert
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_stopped_completes_after_stop() {
        // Arrange
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.stopped(Duration::from_millis(1)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        // Act
        handle.stop();

        // Assert
        timeout(Duration::from_secs(2), task)
            .await
            .expect("stopped() never completed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let server = make_server().await;
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_to_taken_port_returns_bind_error() {
        let first = make_server().await;
        let addr = first.local_addr().unwrap();

        let result = EmulatorServer::bind(addr, Arc::new(PortRegistry::new())).await;

        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_returns_after_stop_with_no_clients() {
        // Arrange
        let server = make_server().await;
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        // Act
        handle.stop();

        // Assert
        timeout(Duration::from_secs(2), task)
            .await
            .expect("server did not stop in time")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_notification_connection() {
        // Arrange – only the primary connection of a pair ever arrives
        let server = make_server().await;
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());
        let _primary = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        handle.stop();

        // Assert
        timeout(Duration::from_secs(2), task)
            .await
            .expect("server did not stop in time")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_connected_sessions() {
        // Arrange
        let server = make_server().await;
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        let mut primary = TcpStream::connect(addr).await.unwrap();
        let mut notification = TcpStream::connect(addr).await.unwrap();
        let mut greeting = [0u8; 16];
        notification.read_exact(&mut greeting).await.unwrap();

        // Act
        handle.stop();
        timeout(Duration::from_secs(2), task)
            .await
            .expect("server did not stop in time")
            .unwrap();

        // Assert – the server side of the primary connection is gone
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(2), primary.read(&mut buf))
            .await
            .expect("primary socket was not closed")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
