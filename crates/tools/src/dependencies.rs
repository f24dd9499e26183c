//! Dependency installer: make packages available to `run_code`.

use async_trait::async_trait;
use quizpilot_config::CodeRunnerConfig;
use quizpilot_core::action::{ADD_DEPENDENCIES, InstallArgs, parse_args};
use quizpilot_core::error::ToolError;
use quizpilot_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::run_code::run_process;

/// Package specs look like `pandas`, `scikit-learn>=1.4` or `uvicorn[standard]`.
pub fn is_valid_package_spec(spec: &str) -> bool {
    let mut chars = spec.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && spec
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-=<>!~[],".contains(c))
}

pub struct AddDependenciesTool {
    settings: CodeRunnerConfig,
    run_dir: PathBuf,
}

impl AddDependenciesTool {
    pub fn new(settings: CodeRunnerConfig, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            run_dir: run_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for AddDependenciesTool {
    fn name(&self) -> &str {
        ADD_DEPENDENCIES
    }

    fn description(&self) -> &str {
        "Install Python packages needed by run_code (e.g. [\"pandas\", \"pypdf\"])."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "packages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Package names, optionally with version specifiers"
                }
            },
            "required": ["packages"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: InstallArgs = parse_args(ADD_DEPENDENCIES, arguments)?;
        let packages: Vec<String> = args.packages.iter().map(|p| p.trim().to_string()).collect();

        if packages.is_empty() {
            return Err(ToolError::InvalidArguments("no packages given".into()));
        }
        if let Some(bad) = packages.iter().find(|p| !is_valid_package_spec(p)) {
            return Err(ToolError::InvalidArguments(format!("invalid package name: '{bad}'")));
        }

        let mut words = self.settings.install_command.split_whitespace();
        let program = words.next().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: ADD_DEPENDENCIES.into(),
            reason: "install command is empty".into(),
        })?;
        let command_args: Vec<String> = words.map(str::to_string).chain(packages.iter().cloned()).collect();

        tokio::fs::create_dir_all(&self.run_dir)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ADD_DEPENDENCIES.into(),
                reason: format!("cannot create {}: {e}", self.run_dir.display()),
            })?;

        info!(packages = ?packages, "Installing dependencies");
        let outcome = run_process(
            ADD_DEPENDENCIES,
            program,
            &command_args,
            &self.run_dir,
            Duration::from_secs(self.settings.install_timeout_secs),
        )
        .await?;

        let data = serde_json::to_value(&outcome).unwrap_or_default();
        let result = if outcome.success() {
            ToolResult::ok(format!("Installed: {}", packages.join(", ")))
        } else {
            ToolResult::failed(outcome.render(self.settings.max_output_chars))
        };
        Ok(result.with_data(data))
    }
}
