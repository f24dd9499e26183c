//! File fetcher: download an attachment into the run's scratch directory.

use async_trait::async_trait;
use quizpilot_config::DownloadConfig;
use quizpilot_core::action::{DOWNLOAD_FILE, FetchArgs, parse_args};
use quizpilot_core::error::ToolError;
use quizpilot_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::validate_url;

const FALLBACK_NAME: &str = "download.bin";

pub struct DownloadTool {
    client: reqwest::Client,
    run_dir: PathBuf,
    timeout_secs: u64,
    max_bytes: u64,
}

impl DownloadTool {
    pub fn new(settings: &DownloadConfig, run_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            run_dir: run_dir.into(),
            timeout_secs: settings.timeout_secs,
            max_bytes: settings.max_bytes,
        }
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: DOWNLOAD_FILE.into(),
            reason: reason.into(),
        }
    }

    fn too_large(&self) -> ToolError {
        Self::failed(format!("file exceeds the {} byte download limit", self.max_bytes))
    }
}

/// Reduce a caller- or URL-supplied name to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn name_from_url(url: &url::Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

#[async_trait]
impl Tool for DownloadTool {
    fn name(&self) -> &str {
        DOWNLOAD_FILE
    }

    fn description(&self) -> &str {
        "Download a file (PDF, CSV, audio, image, ...) from a direct URL into the working directory. \
         Returns the saved local path, which interpret_file and run_code can read."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Direct http(s) URL of the file"
                },
                "filename": {
                    "type": "string",
                    "description": "Optional local file name; defaults to the last URL path segment"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: FetchArgs = parse_args(DOWNLOAD_FILE, arguments)?;
        let url = validate_url(DOWNLOAD_FILE, &args.url)?;

        let file_name = args
            .filename
            .or_else(|| name_from_url(&url))
            .map(|n| sanitize_filename(&n))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let path = self.run_dir.join(&file_name);

        debug!(url = %url, path = %path.display(), "Downloading file");

        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: DOWNLOAD_FILE.into(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Self::failed(format!("request to {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|e| Self::failed(format!("cannot create {}: {e}", self.run_dir.display())))?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Self::failed(format!("cannot create {}: {e}", path.display())))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::failed(format!("download interrupted: {e}")))?
        {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(self.too_large());
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| Self::failed(format!("write failed: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| Self::failed(format!("write failed: {e}")))?;

        info!(url = %url, path = %path.display(), bytes = written, "File downloaded");

        Ok(ToolResult::ok(path.display().to_string()).with_data(serde_json::json!({
            "path": path,
            "bytes": written,
            "content_type": content_type,
        })))
    }
}
