//! What one run leaves behind.

use quizpilot_core::error::RunError;
use quizpilot_core::message::{Conversation, RunId};
use serde::{Deserialize, Serialize};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The grader accepted the last answer and sent no further URL.
    Completed,
    /// The oracle replied with the stop sentinel or called `stop`.
    Stopped,
    /// Step ceiling, oracle failure or a rejected chain.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produced by one invocation of [`crate::QuizAgent::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Oracle invocations
    pub steps: u32,
    pub tool_invocations: u32,
    pub submissions: u32,
    /// The quiz URL the run was working on when it ended
    pub last_url: String,
    pub error: Option<RunError>,
    pub conversation: Conversation,
}

impl RunReport {
    /// Compact JSON view without the conversation, for logs and `/history`.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "status": self.status,
            "steps": self.steps,
            "tool_invocations": self.tool_invocations,
            "submissions": self.submissions,
            "last_url": self.last_url,
            "error": self.error.as_ref().map(|e| e.to_string()),
        })
    }
}
