//! Virtual serial ports and the registry that holds them.
//!
//! A [`VirtualPort`] stands in for one UART on the emulated board.  It owns two
//! [`CircularSerialBuffer`]s, one per direction:
//!
//! ```text
//!                 put_input / input().write
//!  device side ─────────────────────────────►  input  ──► SERR / SERDA ──► client
//!  (test harness,                                                      (pigpio
//!   peer bridge)  ◄─────────────────────────── output ◄── SERW ◄───────  library)
//!                 get_output / output().read
//! ```
//!
//! The names are from the client's point of view: `input` is what a client
//! reads, `output` is what a client writes.
//!
//! The [`PortRegistry`] is filled once at startup and then shared read-only
//! (behind an `Arc`) with every client session.

use std::num::NonZeroUsize;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::serial_buffer::{CircularSerialBuffer, ReadCursor, DEFAULT_BUFFER_CAPACITY};

/// Errors that can occur while populating a [`PortRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A port with the same name and bit rate is already registered.
    #[error("port {name} at {bit_rate} baud is already registered")]
    DuplicatePort { name: String, bit_rate: u32 },
}

// ── VirtualPort ───────────────────────────────────────────────────────────────

/// One emulated serial port, identified by its device path and bit rate.
#[derive(Debug)]
pub struct VirtualPort {
    name: String,
    bit_rate: u32,
    input: CircularSerialBuffer,
    output: CircularSerialBuffer,
}

impl VirtualPort {
    /// Creates a port whose buffers hold [`DEFAULT_BUFFER_CAPACITY`] bytes each.
    pub fn new(name: impl Into<String>, bit_rate: u32) -> Self {
        let capacity =
            NonZeroUsize::new(DEFAULT_BUFFER_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self::with_capacity(name, bit_rate, capacity)
    }

    /// Creates a port whose two buffers each hold `capacity` bytes.
    pub fn with_capacity(name: impl Into<String>, bit_rate: u32, capacity: NonZeroUsize) -> Self {
        Self {
            name: name.into(),
            bit_rate,
            input: CircularSerialBuffer::new(capacity),
            output: CircularSerialBuffer::new(capacity),
        }
    }

    /// Device path, e.g. `/dev/ttyAMA0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bit_rate(&self) -> u32 {
        self.bit_rate
    }

    /// Bytes travelling towards clients (device → client).
    pub fn input(&self) -> &CircularSerialBuffer {
        &self.input
    }

    /// Bytes written by clients (client → device).
    pub fn output(&self) -> &CircularSerialBuffer {
        &self.output
    }

    /// Returns `true` when this port has exactly the given identity.
    pub fn matches(&self, name: &str, bit_rate: u32) -> bool {
        self.bit_rate == bit_rate && self.name == name
    }

    /// Snapshots the current write positions of both buffers.
    ///
    /// Returns `(input_cursor, output_cursor)`.  A reader starting from these
    /// cursors observes only bytes written after the call.
    pub fn bind(&self) -> (ReadCursor, ReadCursor) {
        (self.input.write_cursor(), self.output.write_cursor())
    }

    // ── Device-side convenience wrappers ──────────────────────────────────────

    /// Feeds bytes that clients will see on `SERR`.
    pub fn put_input(&self, bytes: &[u8]) {
        self.input.write(bytes);
    }

    pub fn get_input(&self, cursor: ReadCursor, max_len: usize) -> (Vec<u8>, ReadCursor) {
        self.input.read(cursor, max_len)
    }

    pub fn input_available(&self, cursor: ReadCursor) -> usize {
        self.input.available(cursor)
    }

    pub fn put_output(&self, bytes: &[u8]) {
        self.output.write(bytes);
    }

    /// Reads what clients wrote with `SERW`, starting at `cursor`.
    pub fn get_output(&self, cursor: ReadCursor, max_len: usize) -> (Vec<u8>, ReadCursor) {
        self.output.read(cursor, max_len)
    }

    pub fn output_available(&self, cursor: ReadCursor) -> usize {
        self.output.available(cursor)
    }
}

// ── PortRegistry ──────────────────────────────────────────────────────────────

/// Ordered, append-only collection of the ports an emulator exposes.
///
/// Lookups are a linear scan: a board has a handful of UARTs at most.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: Vec<Arc<VirtualPort>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a port with default-capacity buffers.
    ///
    /// Unlike pigpio's own append-only port list, a second port with the same
    /// `(name, bit_rate)` is refused: `find_port` could never reach it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePort`] if `(name, bit_rate)` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        bit_rate: u32,
    ) -> Result<Arc<VirtualPort>, RegistryError> {
        let capacity =
            NonZeroUsize::new(DEFAULT_BUFFER_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        self.register_with_capacity(name, bit_rate, capacity)
    }

    /// Registers a port whose buffers each hold `capacity` bytes.
    ///
    /// Duplicates are refused as in [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicatePort`] if `(name, bit_rate)` is taken.
    pub fn register_with_capacity(
        &mut self,
        name: impl Into<String>,
        bit_rate: u32,
        capacity: NonZeroUsize,
    ) -> Result<Arc<VirtualPort>, RegistryError> {
        let name = name.into();
        if self.find_port(&name, bit_rate).is_some() {
            return Err(RegistryError::DuplicatePort { name, bit_rate });
        }

        debug!("registering virtual port {name} at {bit_rate} baud ({capacity} byte buffers)");
        let port = Arc::new(VirtualPort::with_capacity(name, bit_rate, capacity));
        self.ports.push(Arc::clone(&port));
        Ok(port)
    }

    /// Finds the port with exactly this name and bit rate.
    pub fn find_port(&self, name: &str, bit_rate: u32) -> Option<Arc<VirtualPort>> {
        self.ports
            .iter()
            .find(|p| p.matches(name, bit_rate))
            .cloned()
    }

    /// All registered ports, in registration order.
    pub fn list_ports(&self) -> &[Arc<VirtualPort>] {
        &self.ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
