//! Subcommand implementations.

pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod serve;

use std::sync::Arc;

use ragbot_agent::{
    ConfiguredChainBuilder, GenerationPipeline, OrchestratorRegistry, OrchestratorSettings,
};
use ragbot_config::{AppConfig, Requirement};

/// Load config and check what `requirement` needs, with a readable error.
pub fn load_config(requirement: Requirement) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Err(e) = config.require(requirement) {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set it in {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!("  or through the matching environment variable, then retry.");
        eprintln!("  Run `ragbot doctor` to check the rest of the setup.");
        eprintln!();
        return Err(e.into());
    }

    Ok(config)
}

/// Wire the conversation core: provider + index → pipeline → registry.
pub fn build_registry(config: &AppConfig) -> Arc<OrchestratorRegistry> {
    let provider = ragbot_providers::build_provider(&config.llm);
    let index = ragbot_providers::build_index(&config.index);
    let builder = ConfiguredChainBuilder::from_config(config, index, provider);

    Arc::new(OrchestratorRegistry::new(
        Arc::new(GenerationPipeline::new(builder)),
        OrchestratorSettings::from_config(config),
    ))
}
