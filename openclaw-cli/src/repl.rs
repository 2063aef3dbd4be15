//! Interactive REPL mode for the OpenClaw CLI.
//!
//! Reads one message per line from stdin and streams each reply to stdout.
//! Ctrl-C stops the reply being generated without leaving the REPL.

use std::future::Future;
use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use openclaw_core::{CancellationToken, Config, GatewayClient, GatewayError, Message};

/// What a line of user input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    /// Blank line.
    Empty,
    /// `/quit` or `/exit`.
    Quit,
    /// `/clear`: forget the conversation.
    Clear,
    /// A message for the agent.
    Send(String),
}

/// Result of waiting at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Prompt {
    Line(String),
    /// End of input.
    Eof,
    /// Ctrl-C while no reply was streaming.
    Interrupted,
}

/// Wait for the next input line, or for `interrupt` to resolve first.
async fn next_prompt<R, F>(lines: &mut Lines<R>, interrupt: F) -> io::Result<Prompt>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        _ = interrupt => Ok(Prompt::Interrupted),
        line = lines.next_line() => Ok(line?.map_or(Prompt::Eof, Prompt::Line)),
    }
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/clear" => Input::Clear,
        text => Input::Send(text.to_string()),
    }
}

/// Conversation history sent with every request.
#[derive(Debug, Default)]
struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Record the assistant's reply, complete or partial. Empty replies are dropped.
    fn push_reply(&mut self, reply: String) {
        if !reply.is_empty() {
            self.messages.push(Message::assistant(reply));
        }
    }

    fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Entry point for the interactive REPL mode.
pub async fn run_repl(client: &GatewayClient, config: &Config) -> Result<()> {
    println!("OpenClaw chat ({}). /clear resets, /quit exits.", config.gateway_url);

    let mut conversation = Conversation::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush stdout")?;

        let line = match next_prompt(&mut lines, tokio::signal::ctrl_c())
            .await
            .context("Failed to read input")?
        {
            Prompt::Line(line) => line,
            Prompt::Eof | Prompt::Interrupted => {
                println!();
                break;
            }
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Clear => {
                conversation.clear();
                println!("Conversation cleared.");
            }
            Input::Send(text) => {
                conversation.push_user(text);
                let (reply, result) = stream_reply(client, config, &conversation.messages).await;
                conversation.push_reply(reply);

                match result {
                    Ok(()) => {}
                    Err(e) if e.is_aborted() => println!("\n[Stopped]"),
                    Err(e) => eprintln!("\nError: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Stream one reply, printing fragments as they arrive.
///
/// Returns the text received so far together with the outcome, so a partial
/// reply survives an interruption or failure.
async fn stream_reply(
    client: &GatewayClient,
    config: &Config,
    messages: &[Message],
) -> (String, Result<(), GatewayError>) {
    let cancel = CancellationToken::new();
    let mut reply = String::new();

    let result = {
        let send = client.stream_with_callbacks(
            config,
            messages,
            |chunk| {
                reply.push_str(chunk);
                print!("{}", chunk);
                let _ = io::stdout().flush();
            },
            || println!(),
            Some(cancel.clone()),
        );
        tokio::pin!(send);

        tokio::select! {
            result = &mut send => result,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                send.await
            }
        }
    };

    (reply, result)
}
