//! Network infrastructure: everything that owns a socket.
//!
//! - **`server`** – listening socket, connection pairing, session table,
//!   shutdown.
//! - **`session`** – the per-client frame loop.
//! - **`peer_bridge`** – optional link between a virtual port and a TCP peer.

pub mod peer_bridge;
pub mod server;
pub mod session;

pub use peer_bridge::{BridgeError, PeerBridge};
pub use server::{EmulatorServer, ServerError, ShutdownHandle};
pub use session::ClientSession;
