//! ClientSession: the control loop for one connected pigpio client.
//!
//! A pigpio client opens two TCP connections.  The *primary* one carries
//! command frames and their responses; the *notification* one is where the
//! real daemon pushes GPIO change reports.  The emulator never reports GPIO
//! changes, so the only thing ever sent there is the greeting frame.
//!
//! # Loop shape
//!
//! ```text
//!  greeting → notification socket
//!  loop:
//!    select {
//!      shutdown signal      → stop (drops a pending read or write)
//!      header (16 bytes)    → read p3 extension bytes
//!                           → decode → CommandHandler → maybe write response
//!      EOF / I/O error      → stop
//!    }
//!  shut down both sockets
//! ```
//!
//! Frames are read with `read_exact`, so TCP segmentation never matters: the
//! loop waits until a whole header and then a whole extension have arrived.
//! A connection that closes halfway through a frame simply ends the session.

use std::net::SocketAddr;
use std::sync::Arc;

use pigpio_core::protocol::messages::HEADER_SIZE;
use pigpio_core::{
    decode_header, decode_request, encode_greeting, encode_response, PortRegistry, ProtocolError,
    Request,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::application::CommandHandler;

/// Largest extension a single frame may announce.
///
/// Bigger than any serial write a client library will issue in one call; a
/// frame above it is treated as a broken stream.
pub const MAX_EXTENSION_LEN: usize = 64 * 1024;

/// Reasons a session stops reading frames other than an orderly disconnect.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("undecodable frame: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("frame announces a {declared} byte extension, limit is {MAX_EXTENSION_LEN}")]
    ExtensionTooLarge { declared: usize },
}

/// One client's pair of connections plus its command state.
pub struct ClientSession {
    id: u64,
    peer_addr: SocketAddr,
    primary: TcpStream,
    notification: TcpStream,
    handler: CommandHandler,
    shutdown: Arc<Notify>,
}

impl ClientSession {
    /// Creates a session over an accepted connection pair.
    ///
    /// `shutdown` is signalled by the server to force the session closed; a
    /// signal sent before [`run`](Self::run) starts waiting is not lost.
    pub fn new(
        id: u64,
        primary: TcpStream,
        notification: TcpStream,
        registry: Arc<PortRegistry>,
        shutdown: Arc<Notify>,
    ) -> Self {
        let peer_addr = primary
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        Self {
            id,
            peer_addr,
            primary,
            notification,
            handler: CommandHandler::new(id, registry),
            shutdown,
        }
    }

    /// Runs the session until the client disconnects or shutdown is signalled.
    pub async fn run(self) {
        let Self {
            id,
            peer_addr,
            mut primary,
            mut notification,
            mut handler,
            shutdown,
        } = self;

        info!("session {id}: started for {peer_addr}");

        if let Err(e) = notification.write_all(&encode_greeting()).await {
            warn!("session {id}: could not send greeting on notification socket: {e}");
        }

        loop {
            let step = tokio::select! {
                _ = shutdown.notified() => {
                    info!("session {id}: closing on server shutdown");
                    break;
                }
                step = serve_next(id, &mut primary, &mut handler) => step,
            };

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Disconnected) => {
                    info!("session {id}: client {peer_addr} disconnected");
                    break;
                }
                Err(e) => {
                    warn!("session {id}: closing after socket failure: {e}");
                    break;
                }
            }
        }

        let open = handler.open_handles();
        if open > 0 {
            debug!("session {id}: dropping {open} open handle(s)");
        }

        // Errors here only mean the peer is already gone.
        let _ = primary.shutdown().await;
        let _ = notification.shutdown().await;
        info!("session {id}: ended");
    }
}

/// Outcome of one read → handle → respond step.
enum Step {
    Continue,
    Disconnected,
}

/// Reads one frame from `primary`, dispatches it and writes the response.
///
/// The whole step is raced against shutdown, so a client that stops reading
/// its responses cannot pin the session in `write_all`.
async fn serve_next(
    id: u64,
    primary: &mut TcpStream,
    handler: &mut CommandHandler,
) -> Result<Step, SessionError> {
    let Some(request) = read_request(primary).await? else {
        return Ok(Step::Disconnected);
    };

    debug!("session {id}: received {}", request.mnemonic());

    if let Some(response) = handler.handle(request) {
        primary.write_all(&encode_response(&response)).await?;
    }
    Ok(Step::Continue)
}

/// Reads one complete command frame from `reader`.
///
/// Returns `Ok(None)` when the stream ends, whether cleanly between frames or
/// in the middle of one.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    if !read_fully(reader, &mut header_buf).await? {
        return Ok(None);
    }
    let header = decode_header(&header_buf)?;

    let declared = header.extension_len();
    if declared > MAX_EXTENSION_LEN {
        return Err(SessionError::ExtensionTooLarge { declared });
    }

    let mut extension = vec![0u8; declared];
    if !read_fully(reader, &mut extension).await? {
        return Ok(None);
    }

    Ok(Some(decode_request(header, &extension)?))
}

/// `read_exact` that reports end-of-stream as `false` instead of an error.
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, std::io::Error>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
