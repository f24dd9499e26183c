//! Submitter: POST an answer to the grader and read its verdict.
//!
//! The configured email and secret are filled into object payloads here, so
//! they never need to appear in the conversation.

use async_trait::async_trait;
use quizpilot_core::action::{SUBMIT_ANSWER, SubmitArgs, parse_args};
use quizpilot_core::error::ToolError;
use quizpilot_core::quiz::SubmissionOutcome;
use quizpilot_core::tool::{Tool, ToolResult};
use std::time::Duration;
use tracing::{debug, info};

use crate::{truncate_chars, validate_url};

/// Who the answers are submitted as.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub struct SubmitTool {
    client: reqwest::Client,
    credentials: Credentials,
    timeout_secs: u64,
}

impl SubmitTool {
    pub fn new(credentials: Credentials, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            credentials,
            timeout_secs,
        }
    }

    /// Add `email`/`secret` to an object payload unless the oracle already set them.
    fn complete_payload(&self, mut payload: serde_json::Value) -> serde_json::Value {
        if let Some(object) = payload.as_object_mut() {
            object
                .entry("email")
                .or_insert_with(|| self.credentials.email.clone().into());
            object
                .entry("secret")
                .or_insert_with(|| self.credentials.secret.clone().into());
        }
        payload
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: SUBMIT_ANSWER.into(),
            reason,
        }
    }
}

fn describe(outcome: &SubmissionOutcome) -> String {
    let mut text = if outcome.correct {
        "Correct.".to_string()
    } else {
        "Incorrect.".to_string()
    };
    if let Some(reason) = &outcome.reason {
        text.push_str(&format!(" Reason: {reason}."));
    }
    match &outcome.next_url {
        Some(url) => text.push_str(&format!(" Next quiz URL: {url}")),
        None if outcome.correct => text.push_str(" No further URL: the quiz chain is complete."),
        None if outcome.retry_allowed => text.push_str(" You may retry this question."),
        None => text.push_str(" No further URL."),
    }
    text.push_str(&format!("\nResponse: {}", outcome.raw));
    text
}

#[async_trait]
impl Tool for SubmitTool {
    fn name(&self) -> &str {
        SUBMIT_ANSWER
    }

    fn description(&self) -> &str {
        "POST a JSON answer to the submission URL given on the quiz page. Your email and secret are added automatically. \
         Returns whether the answer was correct and the next quiz URL, if any."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Submission endpoint exactly as stated on the quiz page"
                },
                "payload": {
                    "type": "object",
                    "description": "JSON body the page asks for, e.g. {\"url\": <quiz url>, \"answer\": <value>}"
                }
            },
            "required": ["url", "payload"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: SubmitArgs = parse_args(SUBMIT_ANSWER, arguments)?;
        let url = validate_url(SUBMIT_ANSWER, &args.url)?;
        let payload = self.complete_payload(args.payload);

        let fields: Vec<&str> = payload
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        debug!(url = %url, fields = ?fields, "Submitting answer");

        let response = self
            .client
            .post(url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: SUBMIT_ANSWER.into(),
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    Self::failed(format!("request to {url} failed: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Self::failed(format!("could not read response: {e}")))?;

        // Graders answer wrong submissions with 4xx and a JSON verdict, so
        // the body is parsed whatever the status.
        let raw: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            Self::failed(format!(
                "HTTP {status}: response is not JSON: {}",
                truncate_chars(&body, 500)
            ))
        })?;
        let outcome = SubmissionOutcome::from_response(raw).ok_or_else(|| {
            Self::failed(format!(
                "HTTP {status}: response has no boolean 'correct': {}",
                truncate_chars(&body, 500)
            ))
        })?;

        info!(
            url = %url,
            status,
            correct = outcome.correct,
            next_url = outcome.next_url.as_deref().unwrap_or("-"),
            "Submission evaluated"
        );

        let data = serde_json::to_value(&outcome)
            .map_err(|e| Self::failed(format!("cannot encode outcome: {e}")))?;
        Ok(ToolResult::ok(describe(&outcome)).with_data(data))
    }
}
