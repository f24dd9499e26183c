//! Quiz requests and grader responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request body that could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid url: {0}")]
    InvalidUrl(String),
}

/// One accepted `POST /quiz` body. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRequest {
    #[serde(default)]
    pub email: String,
    pub secret: String,
    pub url: String,
}

impl QuizRequest {
    /// Validate a JSON body. Field presence is checked before types so a
    /// missing `url` reads as missing rather than as a decode error.
    pub fn from_json(body: &serde_json::Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::InvalidJson)?;
        let field = |name: &'static str| -> Result<String, ValidationError> {
            match object.get(name).and_then(|v| v.as_str()).map(str::trim) {
                Some(value) if !value.is_empty() => Ok(value.to_string()),
                _ => Err(ValidationError::MissingField(name)),
            }
        };

        let url = field("url")?;
        let secret = field("secret")?;
        let email = object
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        let request = Self { email, secret, url };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.secret.is_empty() {
            return Err(ValidationError::MissingField("secret"));
        }
        parse_http_url(&self.url)?;
        Ok(())
    }

    /// Compare the presented secret without short-circuiting on the first
    /// differing byte.
    pub fn secret_matches(&self, expected: &str) -> bool {
        constant_time_eq(self.secret.as_bytes(), expected.as_bytes())
    }
}

/// Schemes a quiz or tool URL may use.
const HTTP_SCHEMES: &[&str] = &["http", "https"];

/// Parse an absolute `http`/`https` URL with a non-empty host.
pub fn parse_http_url(raw: &str) -> Result<url::Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl(format!("'{raw}': {reason}"));
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !HTTP_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("no host".into()));
    }
    Ok(parsed)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The grader's answer to one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub retry_allowed: bool,
    pub raw: serde_json::Value,
}

/// Where the loop goes after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Continue the chain at this URL.
    Advance(String),
    /// Correct and no further question.
    Finished,
    /// Incorrect, but the grader allows another attempt.
    Retry,
    /// Incorrect with nowhere to go.
    Rejected(String),
}

impl SubmissionOutcome {
    /// Parse a grader response body. Returns `None` unless the body is an
    /// object with a boolean `correct`.
    pub fn from_response(raw: serde_json::Value) -> Option<Self> {
        let correct = raw.get("correct")?.as_bool()?;
        let next_url = ["url", "next_url"]
            .iter()
            .filter_map(|key| raw.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|url| !url.is_empty())
            .map(str::to_string);
        let reason = raw
            .get("reason")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let retry_allowed = raw.get("retry").and_then(|v| v.as_bool()).unwrap_or(false);

        Some(Self {
            correct,
            next_url,
            reason,
            retry_allowed,
            raw,
        })
    }

    pub fn verdict(&self) -> Verdict {
        if let Some(url) = &self.next_url {
            return Verdict::Advance(url.clone());
        }
        if self.correct {
            return Verdict::Finished;
        }
        if self.retry_allowed {
            return Verdict::Retry;
        }
        Verdict::Rejected(
            self.reason
                .clone()
                .unwrap_or_else(|| "answer marked incorrect".to_string()),
        )
    }
}
