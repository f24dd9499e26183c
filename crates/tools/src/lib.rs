//! Built-in tool implementations for quizpilot.
//!
//! Each tool is one action the oracle can take on a quiz: render a page,
//! fetch an attachment, preview it, run code, install packages, submit an
//! answer. Tools that touch the filesystem are bound to a run's scratch
//! directory, so a registry is built per run.

pub mod dependencies;
pub mod download;
pub mod interpret;
pub mod render;
pub mod run_code;
pub mod submit;

use quizpilot_config::AppConfig;
use quizpilot_core::error::ToolError;
use quizpilot_core::quiz::parse_http_url;
use quizpilot_core::tool::ToolRegistry;
use std::path::Path;
use std::sync::Arc;

pub use interpret::TablePreview;
pub use render::{ChromiumRenderer, PageRenderer};
pub use submit::Credentials;

/// Parse an http(s) URL argument.
pub fn validate_url(tool: &str, raw: &str) -> Result<url::Url, ToolError> {
    parse_http_url(raw).map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

/// Cap `text` at `max_chars` characters, noting how much was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let rest = text[cut..].chars().count();
            format!("{}\n... [truncated {rest} chars]", &text[..cut])
        }
    }
}

/// Build the tool catalogue for one run.
pub fn quiz_registry(config: &AppConfig, run_dir: &Path, renderer: Arc<dyn PageRenderer>) -> ToolRegistry {
    let credentials = Credentials {
        email: config.email.clone(),
        secret: config.secret.clone().unwrap_or_default(),
    };

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(render::RenderTool::new(renderer, config.browser.max_html_chars)));
    registry.register(Box::new(download::DownloadTool::new(&config.downloads, run_dir)));
    registry.register(Box::new(interpret::InterpretTool::new(config.interpreter.clone(), run_dir)));
    registry.register(Box::new(run_code::RunCodeTool::new(config.code_runner.clone(), run_dir)));
    registry.register(Box::new(dependencies::AddDependenciesTool::new(config.code_runner.clone(), run_dir)));
    registry.register(Box::new(submit::SubmitTool::new(credentials, config.submit.timeout_secs)));
    registry
}
