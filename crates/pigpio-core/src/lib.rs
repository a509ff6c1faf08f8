//! # pigpio-core
//!
//! Shared library for the pigpiod emulator containing the binary command-frame
//! codec and the virtual serial port model.
//!
//! This crate has zero dependencies on sockets, async runtimes, or the file
//! system.  The emulator binary (`pigpiod-emulator`) and any test harness that
//! wants to act as "the device" on the far side of a port both build on it.
//!
//! # Architecture overview (for beginners)
//!
//! The real `pigpiod` daemon runs on a Raspberry Pi and lets client programs
//! drive the board's hardware over a TCP socket.  Client libraries send small
//! fixed-size binary *command frames* ("open serial port", "write these bytes",
//! "how many bytes can I read?") and the daemon answers with *response frames*.
//!
//! The emulator speaks the same protocol, but its serial ports are in-memory
//! ring buffers instead of UARTs.  This crate defines:
//!
//! - **`protocol`** – How bytes travel over the socket.  A command frame is a
//!   16-byte header (four little-endian 32-bit words) optionally followed by an
//!   "extension" payload.  Frames are decoded into typed [`Request`] values and
//!   answers are encoded from [`Response`] values.
//!
//! - **`domain`** – The emulated hardware.  A [`VirtualPort`] owns two
//!   [`CircularSerialBuffer`]s (host→port and port→host), and the
//!   [`PortRegistry`] is the ordered list of ports a running emulator exposes.

pub mod domain;
pub mod protocol;

pub use domain::serial_buffer::{CircularSerialBuffer, ReadCursor, DEFAULT_BUFFER_CAPACITY};
pub use domain::virtual_port::{PortRegistry, RegistryError, VirtualPort};
pub use protocol::codec::{
    decode_header, decode_request, decode_response_result, encode_greeting, encode_request,
    encode_response, ProtocolError,
};
pub use protocol::messages::{CommandCode, FrameHeader, Request, Response};
