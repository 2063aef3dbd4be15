//! OpenClaw CLI - chat with a local OpenClaw gateway from the terminal.

mod commands;
mod repl;

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;

use commands::{Commands, handle_command};
use openclaw_core::{CancellationToken, Config, GatewayClient, Message, StreamEvent};

/// OpenClaw CLI - chat with a local OpenClaw gateway
#[derive(Parser)]
#[command(name = "openclaw")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Message to send (reads from stdin if not provided)
    message: Option<String>,

    /// Enter interactive REPL mode
    #[arg(short, long)]
    repl: bool,

    /// Wait for the full reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Path to a config file (overrides default search locations)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Override the gateway URL from config
    #[arg(short = 'g', long)]
    gateway: Option<String>,

    /// Override the agent id from config
    #[arg(short = 'a', long)]
    agent: Option<String>,

    /// Override the model from config
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Gateway commands
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref gateway) = self.gateway {
            config.gateway_url = gateway.clone();
        }
        if let Some(ref agent) = self.agent {
            config.agent_id = Some(agent.clone());
        }
        if let Some(ref model) = self.model {
            config.model = Some(model.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::discover(args.config.as_deref()).context("Failed to load config")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        gateway = %config.gateway_url,
        agent = config.agent().unwrap_or("-"),
        "Using gateway"
    );

    let client = GatewayClient::new();

    if let Some(ref command) = args.command {
        return handle_command(command, &client, &config).await;
    }

    if args.repl {
        return repl::run_repl(&client, &config).await;
    }

    let message = match get_message(&args) {
        Ok(msg) => msg,
        Err(_) => {
            // No input provided, show help
            Args::parse_from(["openclaw", "--help"]);
            return Ok(());
        }
    };
    let messages = [Message::user(message)];

    if args.no_stream {
        let reply = client
            .complete(&config, &messages)
            .await
            .context("Gateway request failed")?;
        println!("{}", reply);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut stream = client.stream(&config, &messages, Some(cancel.clone()));
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            event = stream.next() => {
                match event {
                    Some(Ok(StreamEvent::TextDelta(text))) => {
                        print!("{}", text);
                        stdout.flush().context("Failed to flush stdout")?;
                    }
                    Some(Ok(StreamEvent::Done)) | None => {
                        println!(); // Final newline
                        break;
                    }
                    Some(Err(e)) if e.is_aborted() => {
                        tracing::debug!("Reply interrupted");
                        println!("\n[Interrupted]");
                        break;
                    }
                    Some(Err(e)) => {
                        return Err(e).context("Gateway request failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                cancel.cancel();
            }
        }
    }

    Ok(())
}

/// Retrieves the message from arguments or stdin.
///
/// Priority: positional argument > stdin > error (if TTY)
fn get_message(args: &Args) -> io::Result<String> {
    if let Some(msg) = &args.message {
        return Ok(msg.clone());
    }

    if io::stdin().is_terminal() {
        // Interactive terminal with no argument - signal to show help
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "No message provided",
        ));
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer.trim_end().to_string())
}
