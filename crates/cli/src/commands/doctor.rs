//! `ragbot doctor`: Diagnose configuration and connectivity.

use ragbot_channels::TelegramChannel;
use ragbot_config::{AppConfig, Requirement};
use ragbot_core::channel::Channel;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("RagBot Doctor: System Diagnostics");
    println!("==================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (run `ragbot onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config and re-run doctor.");
            return Ok(());
        }
    };

    let generation_ready = match config.require(Requirement::Generation) {
        Ok(()) => {
            println!("  ✅ LLM and index keys configured");
            true
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
            false
        }
    };

    if generation_ready {
        let provider = ragbot_providers::build_provider(&config.llm);
        match provider.health_check().await {
            Ok(true) => println!("  ✅ LLM provider reachable ({})", provider.name()),
            Ok(false) => {
                println!("  ❌ LLM provider unhealthy ({})", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ LLM provider: {e}");
                issues += 1;
            }
        }

        let index = ragbot_providers::build_index(&config.index);
        match index.describe().await {
            Ok(stats) => match stats.namespace_vector_count {
                Some(count) => println!(
                    "  ✅ Index '{}' reachable ({count} vectors in '{}')",
                    index.name(),
                    config.index.namespace
                ),
                None => {
                    println!(
                        "  ⚠️  Index '{}' reachable but namespace '{}' is empty or missing",
                        index.name(),
                        config.index.namespace
                    );
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Index '{}': {e}", index.name());
                issues += 1;
            }
        }
    }

    match TelegramChannel::from_settings(&config.telegram) {
        Ok(channel) => match channel.health_check().await {
            Ok(true) => println!("  ✅ Telegram bot token valid"),
            Ok(false) => {
                println!("  ❌ Telegram token does not belong to a bot");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Telegram: {e}");
                issues += 1;
            }
        },
        Err(_) => println!("  ⚠️  No Telegram token (only needed for `ragbot serve`)"),
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
