//! Domain layer: the emulated serial hardware.
//!
//! Nothing in here knows about sockets or frames.  The types are plain,
//! thread-safe data structures that the protocol server and external
//! collaborators (test harnesses, the peer bridge) share.
//!
//! # Sub-modules
//!
//! - **`serial_buffer`** – A fixed-capacity ring buffer with one writer and any
//!   number of independent reader cursors, guarded by a single lock.
//!
//! - **`virtual_port`** – A named serial port (two ring buffers, one per
//!   direction) and the registry that holds every port the emulator exposes.

pub mod serial_buffer;
pub mod virtual_port;
