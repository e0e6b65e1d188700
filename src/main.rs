//! # Scrim - Layer-Shell Overlay Manager
//!
//! Scrim owns on-screen widget surfaces (toasts, bars, popups) on behalf of
//! remote controllers connected over a Unix control socket, and routes raw
//! input events back to whichever controller owns the targeted layer.

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use scrim::{ScrimConfig, ScrimShell};

#[derive(Parser)]
#[command(name = "scrim")]
#[command(about = "A layer-shell overlay manager for widget surfaces")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/scrim/scrim.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the control socket path from the config file
    #[arg(short, long)]
    socket: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting Scrim - Layer-Shell Overlay Manager");
    info!("📄 Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match ScrimConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            info!("📝 Using default configuration");
            ScrimConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(socket) = cli.socket {
        info!("🔗 Control socket overridden via CLI: {}", socket);
        config.general.socket_path = socket;
    }
    if cli.debug {
        config.general.debug = true;
    }

    info!("🏗️  Initializing scrim shell...");
    let shell = ScrimShell::new(config).await?;

    info!("✨ Scrim is ready on {:?}", shell.socket_path());

    // Main event loop
    shell.run().await?;

    info!("👋 Scrim shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["scrim"]).unwrap();
        assert!(!cli.debug);
        assert!(cli.socket.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["scrim", "--debug", "--socket", "/tmp/test.sock"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.socket.as_deref(), Some("/tmp/test.sock"));
    }
}
