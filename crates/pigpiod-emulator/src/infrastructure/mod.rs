//! Infrastructure layer for the emulator.
//!
//! Contains the OS-facing adapters: TCP sockets and configuration files.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `pigpio_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
