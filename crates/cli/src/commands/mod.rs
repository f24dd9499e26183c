pub mod config_cmd;
pub mod doctor;
pub mod serve;
pub mod solve;

use std::path::Path;

use quizpilot_config::AppConfig;

/// Load the config file (or defaults) plus environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}").into())
}
