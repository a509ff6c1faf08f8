//! Storage infrastructure: configuration file handling.
//!
//! The `config` sub-module reads the TOML file describing the listen address,
//! the virtual ports and the peer bridges, falling back to defaults when the
//! file does not exist yet.

pub mod config;
