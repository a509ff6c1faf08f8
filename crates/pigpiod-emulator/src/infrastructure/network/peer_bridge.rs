//! PeerBridge: connects one virtual port to an external TCP peer.
//!
//! Without a bridge, the device side of a virtual port is only reachable
//! in-process (`put_input` / `get_output`).  A bridge makes it reachable over
//! the network, e.g. to a simulator of the card that would sit on that UART:
//!
//! ```text
//!  pigpio client ──SERW──► port.output ──drain loop──► peer
//!  pigpio client ◄─SERR─── port.input  ◄──put_input─── peer
//! ```
//!
//! The drain loop has its own output cursor, taken when the bridge starts, so
//! it never disturbs what sessions read.  It polls the port every
//! millisecond; the buffers have no wake-up mechanism to wait on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pigpio_core::{PortRegistry, ReadCursor, VirtualPort};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::infrastructure::network::server::ShutdownHandle;

/// Interval between two checks of the port's output buffer.
pub const DRAIN_POLL: Duration = Duration::from_millis(1);

const READ_CHUNK: usize = 4096;

/// Errors that can end or prevent a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no virtual port {name} at {bit_rate} baud to bridge")]
    UnknownPort { name: String, bit_rate: u32 },

    #[error("failed to connect to peer {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("bridge I/O error with peer {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A byte shuttle between one [`VirtualPort`] and one TCP peer.
#[derive(Debug)]
pub struct PeerBridge {
    port: Arc<VirtualPort>,
    peer_addr: SocketAddr,
}

impl PeerBridge {
    /// Resolves the port to bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownPort`] if the registry has no such port.
    pub fn new(
        registry: &PortRegistry,
        name: &str,
        bit_rate: u32,
        peer_addr: SocketAddr,
    ) -> Result<Self, BridgeError> {
        let port = registry
            .find_port(name, bit_rate)
            .ok_or_else(|| BridgeError::UnknownPort {
                name: name.to_string(),
                bit_rate,
            })?;
        Ok(Self { port, peer_addr })
    }

    /// Connects to the peer and shuttles bytes until the peer closes, an I/O
    /// error occurs, or `shutdown` is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] if the peer is unreachable and
    /// [`BridgeError::Io`] if the connection fails while running.
    pub async fn run(self, shutdown: ShutdownHandle) -> Result<(), BridgeError> {
        let addr = self.peer_addr;
        let name = self.port.name().to_string();

        // Bound before connecting so nothing written meanwhile is skipped.
        let output_cursor = self.port.output().write_cursor();

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| BridgeError::Connect { addr, source })?;
        info!("bridge {name} <-> {addr}: connected");

        let (read_half, write_half) = stream.into_split();

        let outcome = tokio::select! {
            r = pump_inbound(read_half, &self.port) => r,
            r = drain_outbound(write_half, &self.port, output_cursor, &shutdown) => r,
        };

        match outcome {
            Ok(()) => {
                info!("bridge {name} <-> {addr}: closed");
                Ok(())
            }
            Err(source) => {
                warn!("bridge {name} <-> {addr}: {source}");
                Err(BridgeError::Io { addr, source })
            }
        }
    }
}

/// Peer → port `input`, until the peer closes its side.
async fn pump_inbound(mut read_half: OwnedReadHalf, port: &VirtualPort) -> std::io::Result<()> {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            debug!("bridge {}: peer closed", port.name());
            return Ok(());
        }
        port.put_input(&buf[..n]);
    }
}

/// Port `output` → peer, until shutdown.
///
/// A write to a peer that has stopped reading is abandoned on shutdown.
async fn drain_outbound(
    mut write_half: OwnedWriteHalf,
    port: &VirtualPort,
    mut cursor: ReadCursor,
    shutdown: &ShutdownHandle,
) -> std::io::Result<()> {
    while shutdown.is_running() {
        let available = port.output_available(cursor);
        if available == 0 {
            tokio::time::sleep(DRAIN_POLL).await;
            continue;
        }
        let (bytes, next) = port.get_output(cursor, available);
        cursor = next;
        tokio::select! {
            _ = shutdown.stopped(DRAIN_POLL) => {
                debug!("bridge {}: dropping pending write on shutdown", port.name());
                break;
            }
            written = write_half.write_all(&bytes) => written?,
        }
    }
    Ok(())
}
