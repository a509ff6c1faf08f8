//! TOML-based configuration for the emulator.
//!
//! Reads `EmulatorConfig` from an explicit path or from the platform config
//! file:
//! - Windows:  `%APPDATA%\PigpiodEmulator\config.toml`
//! - Linux:    `~/.config/pigpiod-emulator/config.toml`
//! - macOS:    `~/Library/Application Support/PigpiodEmulator/config.toml`
//!
//! Example:
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! bind_address = "127.0.0.1"
//! port = 8888
//! accept_poll_ms = 200
//!
//! [[ports]]
//! name = "/dev/ttyAMA0"
//! bit_rate = 115200
//! buffer_capacity = 10000
//!
//! [[bridges]]
//! port = "/dev/ttyUSBMotorCard"
//! bit_rate = 115200
//! peer = "127.0.0.1:5000"
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default ...)]`, so an empty file, a file with
//! only `[server]`, or no file at all all produce a working configuration.
//! Leaving out `[[ports]]` entirely gives the two ports of the reference
//! board: `/dev/ttyAMA0` and `/dev/ttyUSBMotorCard`, both at 115200 baud.

use std::net::{AddrParseError, SocketAddr};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pigpio_core::{PortRegistry, RegistryError, DEFAULT_BUFFER_CAPACITY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind_address:port` or a bridge peer is not a socket address.
    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    /// A port was configured with `buffer_capacity = 0`.
    #[error("port {name} has a zero buffer capacity")]
    ZeroCapacity { name: String },

    /// Two `[[ports]]` entries share a name and bit rate.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level emulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmulatorConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_ports")]
    pub ports: Vec<PortEntry>,
    #[serde(default)]
    pub bridges: Vec<BridgeEntry>,
}

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How often the accept loop re-checks for shutdown, in milliseconds.
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,
}

/// One virtual serial port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortEntry {
    pub name: String,
    pub bit_rate: u32,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// A virtual port to connect to a TCP peer at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeEntry {
    pub port: String,
    pub bit_rate: u32,
    pub peer: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_accept_poll_ms() -> u64 {
    200
}
fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}
fn default_ports() -> Vec<PortEntry> {
    ["/dev/ttyAMA0", "/dev/ttyUSBMotorCard"]
        .into_iter()
        .map(|name| PortEntry {
            name: name.to_string(),
            bit_rate: 115_200,
            buffer_capacity: default_buffer_capacity(),
        })
        .collect()
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            ports: default_ports(),
            bridges: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            accept_poll_ms: default_accept_poll_ms(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl ServerConfig {
    /// `bind_address:port` as a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&format!("{}:{}", self.bind_address, self.port))
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms.max(1))
    }
}

impl BridgeEntry {
    /// The peer as a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `peer` is not `ip:port`.
    pub fn peer_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.peer)
    }
}

impl EmulatorConfig {
    /// Registers every configured port, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] or [`ConfigError::Registry`] for
    /// an invalid or duplicate port entry.
    pub fn build_registry(&self) -> Result<PortRegistry, ConfigError> {
        let mut registry = PortRegistry::new();
        for entry in &self.ports {
            let capacity =
                NonZeroUsize::new(entry.buffer_capacity).ok_or_else(|| ConfigError::ZeroCapacity {
                    name: entry.name.clone(),
                })?;
            registry.register_with_capacity(entry.name.clone(), entry.bit_rate, capacity)?;
        }
        Ok(registry)
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse().map_err(|source| ConfigError::InvalidAddress {
        addr: addr.to_string(),
        source,
    })
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `EmulatorConfig` from `path`, returning `EmulatorConfig::default()`
/// if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<EmulatorConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EmulatorConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &EmulatorConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PigpiodEmulator"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("pigpiod-emulator"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PigpiodEmulator")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
