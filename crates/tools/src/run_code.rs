//! Code runner: execute generated source in a fresh subprocess.
//!
//! The escape hatch for anything the other tools cannot do: arithmetic over a
//! downloaded table, decoding an image, transcribing audio. The only isolation
//! is the process boundary and the timeout.

use async_trait::async_trait;
use quizpilot_config::CodeRunnerConfig;
use quizpilot_core::action::{RUN_CODE, RunCodeArgs, parse_args};
use quizpilot_core::error::ToolError;
use quizpilot_core::tool::{Tool, ToolResult};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::truncate_chars;

/// What a finished (or killed) process left behind.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Text shown to the oracle.
    pub fn render(&self, max_chars: usize) -> String {
        let mut text = String::new();
        if self.timed_out {
            text.push_str("[timed out]\n");
        } else if self.exit_code != Some(0) {
            let code = self.exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            text.push_str(&format!("[exit code: {code}]\n"));
        }
        text.push_str(self.stdout.trim_end());
        if !self.stderr.trim().is_empty() {
            text.push_str("\n[stderr]:\n");
            text.push_str(self.stderr.trim_end());
        }
        truncate_chars(text.trim(), max_chars)
    }
}

/// Spawn `program args..` in `cwd` and wait at most `timeout`.
///
/// The child is killed when the timeout fires; its partial output is lost
/// but the outcome still records `timed_out`.
pub async fn run_process(
    tool_name: &str,
    program: &str,
    args: &[String],
    cwd: &std::path::Path,
    timeout: Duration,
) -> Result<ProcessOutcome, ToolError> {
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: format!("failed to start '{program}': {e}"),
        })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        }),
        // Dropping the future drops the child, which kills it.
        Err(_) => Ok(ProcessOutcome {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: true,
        }),
    }
}

pub struct RunCodeTool {
    settings: CodeRunnerConfig,
    run_dir: PathBuf,
}

impl RunCodeTool {
    pub fn new(settings: CodeRunnerConfig, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            run_dir: run_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for RunCodeTool {
    fn name(&self) -> &str {
        RUN_CODE
    }

    fn description(&self) -> &str {
        "Run a Python program in a fresh process inside the working directory (where downloaded files live). \
         Returns stdout, stderr and the exit code. Print the values you need; nothing else is returned."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Complete program source"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: RunCodeArgs = parse_args(RUN_CODE, arguments)?;

        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: RUN_CODE.into(),
                reason: format!("cannot create {}: {e}", self.run_dir.display()),
            })?;
        let script = self.run_dir.join(format!("snippet-{}.py", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&script, &args.code)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: RUN_CODE.into(),
                reason: format!("cannot write {}: {e}", script.display()),
            })?;

        debug!(script = %script.display(), bytes = args.code.len(), "Running code");

        let outcome = run_process(
            RUN_CODE,
            &self.settings.interpreter,
            &[script.display().to_string()],
            &self.run_dir,
            Duration::from_secs(self.settings.timeout_secs),
        )
        .await?;

        if !outcome.success() {
            warn!(exit_code = ?outcome.exit_code, timed_out = outcome.timed_out, "Code run failed");
        }

        let output = outcome.render(self.settings.max_output_chars);
        let data = serde_json::to_value(&outcome).unwrap_or_default();
        let result = if outcome.success() {
            ToolResult::ok(output)
        } else {
            ToolResult::failed(output)
        };
        Ok(result.with_data(data))
    }
}
