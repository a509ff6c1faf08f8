//! pigpiod emulator entry point.
//!
//! Serves the serial subset of the pigpiod socket protocol on a TCP port so
//! that programs written against a pigpio client library can run without a
//! Raspberry Pi.  The "UARTs" are in-memory virtual ports; their device side
//! can be fed in-process or through a peer bridge to another TCP endpoint.
//!
//! # Usage
//!
//! ```text
//! pigpiod-emulator [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Config file [default: platform config dir]
//!   --bind <IP>       Listen address (overrides [server].bind_address)
//!   --port <PORT>     Listen port (overrides [server].port)
//!   --init-config     Write the effective configuration to the config path and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Overrides           |
//! |---------------------|---------------------|
//! | `PIGPIOD_EMU_BIND`  | `[server].bind_address` |
//! | `PIGPIOD_EMU_PORT`  | `[server].port`     |
//! | `RUST_LOG`          | `log_level`         |
//!
//! CLI args take precedence over environment variables, which take precedence
//! over the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pigpiod_emulator::infrastructure::network::{EmulatorServer, PeerBridge};
use pigpiod_emulator::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, EmulatorConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Emulates the serial subset of the pigpiod daemon over TCP.
#[derive(Debug, Parser)]
#[command(
    name = "pigpiod-emulator",
    about = "pigpiod-compatible serial port emulator",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// When absent, the platform config directory is used; a missing file
    /// means built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long, env = "PIGPIOD_EMU_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "PIGPIOD_EMU_PORT")]
    port: Option<u16>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    /// The config file path: `--config`, else the platform default.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }

    /// Applies `--bind` / `--port` on top of the file configuration.
    fn apply_overrides(&self, mut config: EmulatorConfig) -> EmulatorConfig {
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the config file is loaded (defaults if it
///    does not exist), then CLI overrides are applied.
/// 2. `tracing_subscriber` is initialised: `RUST_LOG` if set, otherwise the
///    config's `log_level`.
/// 3. The port registry is built and the listener bound.
/// 4. Every configured peer bridge is started on its own task.
/// 5. A Ctrl+C handler stops the server and the bridges.
/// 6. The server runs until it has closed every session.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    let config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let config = cli.apply_overrides(config);

    if cli.init_config {
        save_config_to(&config_path, &config)
            .with_context(|| format!("failed to write config to {}", config_path.display()))?;
        println!("wrote {}", config_path.display());
        return Ok(());
    }

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .init();

    info!("pigpiod emulator starting (config: {})", config_path.display());

    // ── Virtual ports ─────────────────────────────────────────────────────────
    let registry = config
        .build_registry()
        .context("invalid [[ports]] configuration")?;
    for port in registry.list_ports() {
        info!("virtual port {} at {} baud", port.name(), port.bit_rate());
    }
    let registry = Arc::new(registry);

    // ── Server ────────────────────────────────────────────────────────────────
    let addr = config
        .server
        .socket_addr()
        .context("invalid [server] address")?;
    let server = EmulatorServer::bind(addr, Arc::clone(&registry))
        .await?
        .with_accept_poll(config.server.accept_poll());
    let shutdown = server.shutdown_handle();

    // ── Peer bridges ──────────────────────────────────────────────────────────
    let mut bridge_tasks = Vec::new();
    for entry in &config.bridges {
        let peer = entry
            .peer_addr()
            .with_context(|| format!("invalid peer for bridge on {}", entry.port))?;
        let bridge = PeerBridge::new(&registry, &entry.port, entry.bit_rate, peer)
            .context("invalid [[bridges]] configuration")?;
        let bridge_shutdown = shutdown.clone();
        bridge_tasks.push(tokio::spawn(async move {
            if let Err(e) = bridge.run(bridge_shutdown).await {
                warn!("bridge ended: {e}");
            }
        }));
    }

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                ctrl_c_shutdown.stop();
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    server.run().await;

    shutdown.stop();
    for task in bridge_tasks {
        if let Err(e) = task.await {
            error!("bridge task failed: {e}");
        }
    }

    info!("pigpiod emulator stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        // Arrange: no arguments
        let cli = Cli {
            config: None,
            bind: None,
            port: None,
            init_config: false,
        };

        // Act
        let config = cli.apply_overrides(EmulatorConfig::default());

        // Assert
        assert_eq!(config, EmulatorConfig::default());
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["pigpiod-emulator", "--port", "9999"]);
        let config = cli.apply_overrides(EmulatorConfig::default());
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = Cli::parse_from(["pigpiod-emulator", "--bind", "0.0.0.0"]);
        let config = cli.apply_overrides(EmulatorConfig::default());
        assert_eq!(config.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_cli_explicit_config_path_wins() {
        let cli = Cli::parse_from(["pigpiod-emulator", "--config", "/tmp/emu.toml"]);
        assert_eq!(cli.config_path().unwrap(), PathBuf::from("/tmp/emu.toml"));
    }

    #[test]
    fn test_cli_init_config_flag() {
        let cli = Cli::parse_from(["pigpiod-emulator", "--init-config"]);
        assert!(cli.init_config);
    }

    #[test]
    fn test_cli_rejects_out_of_range_port() {
        let result = Cli::try_parse_from(["pigpiod-emulator", "--port", "70000"]);
        assert!(result.is_err());
    }
}
