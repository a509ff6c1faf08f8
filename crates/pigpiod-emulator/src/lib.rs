//! pigpiod-emulator library entry point.
//!
//! A stand-in for the Raspberry Pi `pigpiod` daemon that answers the serial
//! subset of its socket protocol (`SERO`, `SERC`, `SERW`, `SERR`, `SERDA`)
//! against in-memory virtual ports, so software written against a pigpio
//! client library can run on a development machine.
//!
//! # Layers
//!
//! ```text
//! pigpio client library  (two TCP connections per client)
//!         ↕
//! [pigpiod-emulator]
//!   ├── application/      Per-session command handling (no sockets)
//!   └── infrastructure/
//!         ├── network/    Accept loop, client sessions, peer bridges
//!         └── storage/    TOML configuration
//!         ↕
//! pigpio-core  (frame codec, virtual ports, circular buffers)
//! ```
//!
//! Re-exports all public modules so that integration tests in `tests/` and the
//! binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;
