//! `ragbot serve`: Run the Telegram bot.

use std::sync::Arc;

use ragbot_agent::{DispatchSettings, MessageDispatcher};
use ragbot_channels::TelegramChannel;
use ragbot_config::Requirement;
use ragbot_core::channel::Channel;
use ragbot_memory::FileTurnLog;
use tracing::{error, info};

use super::{build_registry, load_config};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(Requirement::Serving)?;

    println!("RagBot: Starting Telegram bot");
    println!("   Model:   {}", config.llm.model);
    println!("   Index:   {}", config.index.name);
    if config.bot.trigger_word.is_empty() {
        println!("   Trigger: (none, every message is a question)");
    } else {
        println!("   Trigger: {}", config.bot.trigger_word);
    }
    println!("   Users:   {}", config.storage.users_path.display());

    let registry = build_registry(&config);
    match registry.initialize().await {
        Ok(()) => info!("Pipeline ready"),
        Err(e) => error!(error = %e, "Pipeline initialization failed; serving in degraded mode"),
    }

    let channel = Arc::new(TelegramChannel::from_settings(&config.telegram)?);
    let turn_log = Arc::new(FileTurnLog::new(config.storage.users_path.clone()));
    let dispatcher = Arc::new(MessageDispatcher::new(
        registry,
        turn_log,
        channel.clone(),
        DispatchSettings::from_config(&config),
    ));

    let incoming = channel.start().await?;
    let dispatch = tokio::spawn(dispatcher.run(incoming));

    shutdown_signal().await;
    info!("Shutdown signal received");

    channel.stop().await?;
    if let Err(e) = dispatch.await {
        error!(error = %e, "Dispatcher task failed");
    }

    info!("RagBot stopped");
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
