//! `quizpilot config`: Configuration management commands.

use std::path::{Path, PathBuf};

use quizpilot_config::AppConfig;

use super::load_config;

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path.map_or_else(AppConfig::config_path, Path::to_path_buf)
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config.redacted())?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", resolve(config_path).display());
}

pub fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve(config_path);
    write_default(&path, force)?;
    println!("Wrote default config to {}", path.display());
    println!("Set EMAIL, SECRET and an API key (GEMINI_API_KEY or QUIZPILOT_API_KEY) before serving.");
    Ok(())
}

fn write_default(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");
    let config = load_config(config_path)?;
    println!("   ok  config parsed");

    match config.validate_for_serving() {
        Ok(()) => println!("   ok  ready to serve"),
        Err(e) => {
            println!("   !!  {e}");
            return Err(e.into());
        }
    }

    println!();
    println!("   Provider:  {}", config.provider);
    println!("   Model:     {}", config.model_for(&config.provider));
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Max steps: {}", config.agent.max_steps);
    println!(
        "   LLM rate:  {}/min (burst {})",
        config.agent.requests_per_minute, config.agent.burst
    );
    Ok(())
}
