//! Page renderer: fully rendered HTML through headless Chromium.
//!
//! Quiz pages build their question with JavaScript, so a plain GET is not
//! enough. The browser engine sits behind [`PageRenderer`] so the loop can
//! be tested without Chrome installed.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use futures::StreamExt;
use quizpilot_config::BrowserConfig;
use quizpilot_core::action::{RENDER_PAGE, RenderArgs, parse_args};
use quizpilot_core::error::ToolError;
use quizpilot_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{truncate_chars, validate_url};

/// Anything that turns a URL into rendered HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, ToolError>;
}

/// Launches a fresh headless Chromium per render.
///
/// Each launch gets its own profile directory so concurrent runs never
/// fight over Chrome's profile lock.
pub struct ChromiumRenderer {
    settings: BrowserConfig,
}

impl ChromiumRenderer {
    pub fn new(settings: BrowserConfig) -> Self {
        Self { settings }
    }

    fn launch_config(&self, profile_dir: &std::path::Path) -> Result<CdpConfig, ToolError> {
        let mut builder = CdpConfig::builder()
            .request_timeout(Duration::from_secs(self.settings.timeout_secs))
            .user_data_dir(profile_dir);
        if let Some(path) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(|reason| failed(format!("browser config: {reason}")))
    }

    async fn render_in(&self, url: &str, profile_dir: &std::path::Path) -> Result<String, ToolError> {
        let (mut browser, mut handler) = Browser::launch(self.launch_config(profile_dir)?)
            .await
            .map_err(|e| failed(format!("failed to launch browser: {e}")))?;

        let events = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let html = async {
            let page = browser
                .new_page(url)
                .await
                .map_err(|e| failed(format!("navigation to {url} failed: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| failed(format!("page load failed: {e}")))?;
            // Network-idle approximation: let late XHR and timers land.
            tokio::time::sleep(Duration::from_millis(self.settings.settle_ms)).await;
            page.content()
                .await
                .map_err(|e| failed(format!("could not read page content: {e}")))
        }
        .await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser close failed");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "Browser wait failed");
        }
        events.abort();

        html
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: RENDER_PAGE.into(),
        reason,
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> Result<String, ToolError> {
        let profile_dir = std::env::temp_dir().join(format!("quizpilot-chrome-{}", uuid::Uuid::new_v4()));
        let timeout_secs = self.settings.timeout_secs;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.render_in(url, &profile_dir),
        )
        .await
        .unwrap_or(Err(ToolError::Timeout {
            tool_name: RENDER_PAGE.into(),
            timeout_secs,
        }));

        if let Err(e) = tokio::fs::remove_dir_all(&profile_dir).await {
            debug!(path = %profile_dir.display(), error = %e, "Could not remove browser profile");
        }
        result
    }
}

/// The `render_page` tool.
pub struct RenderTool {
    renderer: Arc<dyn PageRenderer>,
    max_chars: usize,
}

impl RenderTool {
    pub fn new(renderer: Arc<dyn PageRenderer>, max_chars: usize) -> Self {
        Self { renderer, max_chars }
    }
}

#[async_trait]
impl Tool for RenderTool {
    fn name(&self) -> &str {
        RENDER_PAGE
    }

    fn description(&self) -> &str {
        "Open a URL in a headless browser, run its JavaScript, and return the fully rendered HTML. \
         Use this for every quiz page; plain HTTP fetches miss dynamically inserted content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL of the page to render"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: RenderArgs = parse_args(RENDER_PAGE, arguments)?;
        validate_url(RENDER_PAGE, &args.url)?;

        debug!(url = %args.url, "Rendering page");
        let html = self.renderer.render(&args.url).await.inspect_err(|e| {
            warn!(url = %args.url, error = %e, "Render failed");
        })?;

        let total_chars = html.chars().count();
        let output = truncate_chars(&html, self.max_chars);
        Ok(ToolResult::ok(output).with_data(serde_json::json!({
            "url": args.url,
            "chars": total_chars,
            "truncated": total_chars > self.max_chars,
        })))
    }
}
