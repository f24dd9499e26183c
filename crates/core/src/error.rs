//! Error types for the quizpilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A tool invocation failure. Never fatal to a run: the loop renders it
/// into a tool message so the oracle can re-plan.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Why a quiz run ended in the `failed` state.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Step ceiling of {max_steps} reached without finishing the quiz chain")]
    LoopLimit { max_steps: u32 },

    #[error("Oracle invocation failed: {0}")]
    Oracle(#[from] ProviderError),

    #[error("Submission rejected for {url}: {reason}")]
    SubmissionRejected { url: String, reason: String },
}
