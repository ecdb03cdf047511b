//! CastBridge CLI: run and inspect the capture-session bridge.
//!
//! Usage:
//!   castbridge serve [--socket PATH]     Run the consumer end of the frame channel
//!   castbridge simulate [OPTIONS]        Run a full session against a simulated host
//!   castbridge check                     Check configuration and the rendezvous socket

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use castbridge_common::config::BridgeConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "castbridge",
    about = "Screen capture session bridge between a capture surface and a media stack",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the standard location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consumer end of the frame channel
    Serve {
        /// Socket path (defaults to the configured rendezvous path)
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Run one session end to end against a simulated privilege host
    Simulate {
        /// Delay before the simulated user grants consent
        #[arg(long, default_value = "250")]
        consent_after_ms: u64,

        /// Refuse consent instead of granting it
        #[arg(long)]
        deny: bool,

        /// Number of synthetic frames to send
        #[arg(long, default_value = "60")]
        frames: u32,

        /// Frame width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "240")]
        height: u32,

        /// Correlation code shown in the status line
        #[arg(long)]
        code: Option<String>,
    },

    /// Check configuration and the rendezvous socket
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => BridgeConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    castbridge_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Serve { socket } => commands::serve::run(&config, socket).await,
        Commands::Simulate {
            consent_after_ms,
            deny,
            frames,
            width,
            height,
            code,
        } => {
            commands::simulate::run(
                &config,
                commands::simulate::Options {
                    consent_after_ms,
                    deny,
                    frames,
                    width,
                    height,
                    code,
                },
            )
            .await
        }
        Commands::Check => commands::check::run(&config, cli.config.as_deref()),
    }
}
