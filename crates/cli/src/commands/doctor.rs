//! `quizpilot doctor`: Diagnose configuration and external dependencies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quizpilot_config::AppConfig;

use super::load_config;

const CHROME_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("quizpilot doctor: system diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let path = config_path.map_or_else(AppConfig::config_path, Path::to_path_buf);
    if path.exists() {
        println!("  ok  Config file: {}", path.display());
    } else {
        println!("  --  No config file at {} (defaults + environment)", path.display());
    }

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("  ok  Config valid");
            config
        }
        Err(e) => {
            println!("  !!  {e}");
            println!("\n  1 issue found. Fix the config and run doctor again.");
            return Ok(());
        }
    };

    if config.has_api_key() || config.provider == "ollama" {
        println!("  ok  API key configured for '{}'", config.provider);
    } else {
        println!("  !!  No API key for '{}' (set QUIZPILOT_API_KEY or the provider's own key variable)", config.provider);
        issues += 1;
    }

    if config.email.trim().is_empty() {
        println!("  !!  EMAIL is not set");
        issues += 1;
    } else {
        println!("  ok  Email: {}", config.email);
    }

    if config.secret.as_deref().is_none_or(|s| s.trim().is_empty()) {
        println!("  !!  SECRET is not set; every POST /quiz would be rejected");
        issues += 1;
    } else {
        println!("  ok  Secret configured");
    }

    match find_chrome(config.browser.chrome_executable.as_deref()) {
        Some(chrome) => println!("  ok  Chromium: {}", chrome.display()),
        None => {
            println!("  !!  No Chromium/Chrome found (set browser.chrome_executable)");
            issues += 1;
        }
    }

    match interpreter_version(&config.code_runner.interpreter).await {
        Some(version) => println!("  ok  Interpreter: {version}"),
        None => {
            println!("  !!  '{}' is not runnable", config.code_runner.interpreter);
            issues += 1;
        }
    }

    let router = quizpilot_providers::build_from_config(&config);
    match router.default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => println!("  ok  Provider '{}' reachable", provider.name()),
            Ok(false) => {
                println!("  !!  Provider '{}' answered but is unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  !!  Provider '{}': {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  !!  Provider '{}' is not configured", config.provider);
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// The configured executable if it exists, else the first candidate on `PATH`.
fn find_chrome(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| CHROME_CANDIDATES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

async fn interpreter_version(interpreter: &str) -> Option<String> {
    let output = tokio::time::timeout(
        Duration::from_secs(10),
        tokio::process::Command::new(interpreter)
            .arg("--version")
            .kill_on_drop(true)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Some(String::from_utf8_lossy(&text).trim().to_string())
}
