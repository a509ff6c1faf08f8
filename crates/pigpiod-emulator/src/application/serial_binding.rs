//! SerialBinding: one open handle on a virtual port, owned by one session.
//!
//! Opening a port does not copy or lock anything.  The binding just remembers
//! which [`VirtualPort`] it points at and where its private read cursors sit.
//! Two sessions that open the same port therefore share the bytes but each
//! make their own read progress.

use std::sync::Arc;

use pigpio_core::{ReadCursor, VirtualPort};

/// A session's open handle on a [`VirtualPort`].
#[derive(Debug)]
pub struct SerialBinding {
    port: Arc<VirtualPort>,
    handle: u32,
    input_cursor: ReadCursor,
    output_cursor: ReadCursor,
}

impl SerialBinding {
    /// Binds `port` under `handle`, with both cursors at the current write
    /// positions.  Bytes that arrived before the open are never returned.
    pub fn open(port: Arc<VirtualPort>, handle: u32) -> Self {
        let (input_cursor, output_cursor) = port.bind();
        Self {
            port,
            handle,
            input_cursor,
            output_cursor,
        }
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn port(&self) -> &Arc<VirtualPort> {
        &self.port
    }

    /// Where this binding's `SERR` reads resume.
    pub fn input_cursor(&self) -> ReadCursor {
        self.input_cursor
    }

    /// Write position of the port's output buffer when the binding was opened.
    pub fn output_cursor(&self) -> ReadCursor {
        self.output_cursor
    }

    /// Sends `data` towards the device side of the port.
    pub fn write(&self, data: &[u8]) {
        self.port.put_output(data);
    }

    /// Reads up to `max_len` bytes the device produced since the last read,
    /// clamped to what is available, and advances the cursor.
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        let (bytes, next) = self.port.get_input(self.input_cursor, max_len);
        self.input_cursor = next;
        bytes
    }

    /// Bytes waiting to be read on this binding.
    pub fn available(&self) -> usize {
        self.port.input_available(self.input_cursor)
    }
}
