//! `quizpilot serve`: Start the HTTP frontend.

use std::path::Path;

use super::load_config;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    config.validate_for_serving()?;

    println!("quizpilot gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider, config.model_for(&config.provider));
    println!("   Scratch:   {}", config.scratch_dir.display());

    quizpilot_gateway::start(config).await?;

    Ok(())
}
