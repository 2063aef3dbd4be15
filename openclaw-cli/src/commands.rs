//! Gateway subcommands for the OpenClaw CLI.
//!
//! Defines the [`Commands`] enum parsed by `clap` and the
//! [`handle_command`] dispatcher.

use anyhow::{Result, bail};
use clap::Subcommand;

use openclaw_core::gateway::endpoint_url;
use openclaw_core::{Config, GatewayClient};

/// Top-level subcommands for the `openclaw` binary.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Check whether the gateway is reachable
    Health,
}

/// Handle gateway subcommands.
pub(crate) async fn handle_command(
    command: &Commands,
    client: &GatewayClient,
    config: &Config,
) -> Result<()> {
    match command {
        Commands::Health => {
            let endpoint = endpoint_url(config);
            if client.probe(config).await {
                println!("Gateway reachable at {}", endpoint);
                Ok(())
            } else {
                bail!("Gateway unreachable at {}", endpoint)
            }
        }
    }
}
