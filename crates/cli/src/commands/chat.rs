//! `ragbot chat`: Ask questions from the terminal.

use std::io::Write;
use std::sync::Arc;

use ragbot_agent::{Dispatch, DispatchSettings, MessageDispatcher};
use ragbot_channels::cli::line_to_message;
use ragbot_channels::CliChannel;
use ragbot_config::Requirement;
use ragbot_core::channel::Channel;
use ragbot_core::retriever::DocumentRef;
use ragbot_memory::InMemoryTurnLog;
use tracing::warn;

use super::{build_registry, load_config};

pub async fn run(message: Option<String>, show_sources: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(Requirement::Generation)?;
    let registry = build_registry(&config);

    if let Err(e) = registry.initialize().await {
        warn!(error = %e, "Starting without a ready pipeline; the first question will retry");
    }

    let channel = Arc::new(CliChannel::new());
    // Terminal turns stay out of the Telegram users file.
    let dispatcher = MessageDispatcher::new(
        registry,
        Arc::new(InMemoryTurnLog::new()),
        channel.clone(),
        DispatchSettings::from_config(&config).without_trigger(),
    );

    if let Some(text) = message {
        let msg = line_to_message(channel.id(), 1, &text).ok_or("Message is empty")?;
        let outcome = dispatcher.handle(msg).await;
        print_sources(&outcome, show_sources);
        return Ok(());
    }

    println!();
    println!("  RagBot: Interactive Mode");
    println!();
    println!("  Model:     {}", config.llm.model);
    println!("  Index:     {} (namespace '{}')", config.index.name, config.index.namespace);
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut rx = channel.start().await.map_err(|e| format!("Channel error: {e}"))?;

    prompt()?;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(msg) => {
                let outcome = dispatcher.handle(msg).await;
                print_sources(&outcome, show_sources);
                prompt()?;
            }
            Err(e) => {
                eprintln!("  [Channel Error] {e}");
                break;
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_sources(outcome: &Dispatch, show_sources: bool) {
    let Dispatch::Answered(reply) = outcome else {
        return;
    };
    if !show_sources || reply.sources.is_empty() {
        return;
    }

    println!("  Sources:");
    for doc in &reply.sources {
        println!("    {}", describe_source(doc));
    }
    println!();
}

fn describe_source(doc: &DocumentRef) -> String {
    match doc.source() {
        Some(source) => format!("[{:.3}] {source} ({})", doc.score, doc.id),
        None => format!("[{:.3}] {}", doc.score, doc.id),
    }
}
