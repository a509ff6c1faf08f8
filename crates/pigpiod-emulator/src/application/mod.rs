//! Application layer: what a client session does with each decoded command.
//!
//! Nothing here touches a socket.  The network layer reads a frame, hands the
//! decoded [`pigpio_core::Request`] to a [`CommandHandler`], and writes back
//! whatever response comes out.

pub mod handle_commands;
pub mod serial_binding;

pub use handle_commands::CommandHandler;
pub use serial_binding::SerialBinding;
