// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use chatstream::chat::ChatSession;
use chatstream::config;
use chatstream::store::{MessageStore, StoreEvent, SubscriptionId};

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatstream", about = "Interactive client for a streaming chat backend")]
struct Cli {
    /// Path to the chatstream.yaml config file
    #[arg(long, default_value = "chatstream.yaml", env = "CHATSTREAM_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource::new(&cli.config);
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        stream_url = %config.backend.stream_url(),
        session_key = %config.store.session_key,
        persistent = config.store.data_dir.is_some(),
        "config loaded"
    );

    let chat = match ChatSession::from_config(&config) {
        Ok(chat) => chat,
        Err(e) => {
            tracing::error!("failed to start chat session: {e}");
            std::process::exit(1);
        }
    };
    attach_renderer(chat.store());
    print_transcript(chat.store());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("failed to read stdin: {e}");
                break;
            }
        };

        match line.trim() {
            "" => {}
            "/quit" => break,
            "/reset" => {
                let id = chat.reset_session();
                println!("(new conversation {id})");
            }
            "/clear" => {
                chat.clear_conversation();
                print_transcript(chat.store());
            }
            text => run_turn(&chat, text).await,
        }
    }

    // Leaving the client is the unload event: start fresh next time.
    chat.reset_session();
}

/// Send one message and wait for the reply. Ctrl-C cancels the reply.
async fn run_turn(chat: &ChatSession, text: &str) {
    let turn = chat.ask(text);
    tokio::pin!(turn);
    loop {
        tokio::select! {
            result = &mut turn => {
                match result {
                    Ok(outcome) => tracing::debug!(reason = %outcome.reason, "reply finished"),
                    Err(e) => println!("! {e}"),
                }
                return;
            }
            _ = tokio::signal::ctrl_c() => {
                chat.cancel_stream().await;
            }
        }
    }
}

/// Print streamed content as it arrives. Appends are written as deltas;
/// any other change reprints the message on a new line.
fn attach_renderer(store: &Arc<MessageStore>) -> SubscriptionId {
    let weak = Arc::downgrade(store);
    let printed = Mutex::new(String::new());
    store.subscribe(move |event| {
        let (index, done) = match *event {
            StoreEvent::ContentUpdated { index } => (index, false),
            StoreEvent::StreamFinalized { index } => (index, true),
            _ => return,
        };
        let Some(message) = weak.upgrade().and_then(|store| store.message(index)) else {
            return;
        };

        let mut printed = printed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = std::io::stdout().lock();
        let written = match message.content.strip_prefix(printed.as_str()) {
            Some(delta) => write!(out, "{delta}"),
            None => write!(out, "\n{}", message.content),
        };
        let written = written.and_then(|()| {
            if done {
                writeln!(out)
            } else {
                out.flush()
            }
        });
        if let Err(e) = written {
            tracing::debug!("stdout write failed: {e}");
        }

        if done {
            printed.clear();
        } else {
            *printed = message.content;
        }
    })
}

fn print_transcript(store: &MessageStore) {
    for message in store.messages() {
        println!("[{}] {}", message.role, message.content);
    }
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    if write!(out, "> ").and_then(|()| out.flush()).is_err() {
        tracing::debug!("stdout closed");
    }
}
