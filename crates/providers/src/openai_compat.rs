//! OpenAI-compatible provider implementation.
//!
//! Works with Gemini (through its OpenAI endpoint), OpenAI, OpenRouter,
//! Ollama, vLLM and any other `/chat/completions` server with tool calling.

use async_trait::async_trait;
use quizpilot_core::error::ProviderError;
use quizpilot_core::message::{Message, MessageToolCall, Role};
use quizpilot_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(DEFAULT_TIMEOUT),
        }
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Gemini through Google's OpenAI-compatible endpoint.
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            api_key,
        )
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Ollama doesn't need a real key.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), "ollama")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    /// Turn a parsed response into our domain types. Calls without an id
    /// (some Gemini responses) get a generated one so tool results can link
    /// back to them.
    fn parse_response(api_response: ApiResponse, requested_model: &str) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: if tc.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    tc.id
                },
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let mut message = Message::assistant(choice.message.content.unwrap_or_default());
        message.tool_calls = tool_calls;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model.unwrap_or_else(|| requested_model.to_string()),
            metadata: serde_json::Map::new(),
        })
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

#[async_trait]
impl quizpilot_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::parse_response(api_response, &request.model)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use quizpilot_core::Provider;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gemini-2.5-flash".into(),
            messages: vec![Message::user("https://quiz.example.com")],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
        }
    }

    #[test]
    fn gemini_constructor() {
        let provider = OpenAiCompatProvider::gemini("key");
        assert_eq!(provider.name(), "gemini");
        assert!(provider.base_url().contains("generativelanguage.googleapis.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "render_page".into(),
            arguments: r#"{"url":"https://q.example"}"#.into(),
        }];
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[
            Message::system("rules"),
            msg,
            Message::tool_result("call_1", "<html></html>"),
        ]);
        assert_eq!(api_msgs[0].role, "system");
        let tc = api_msgs[1].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "render_page");
        assert_eq!(api_msgs[2].role, "tool");
        assert_eq!(api_msgs[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn body_includes_tools_and_max_tokens() {
        let mut req = request();
        req.max_tokens = Some(512);
        req.tools = vec![ToolDefinition {
            name: "run_code".into(),
            description: "Run Python".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = OpenAiCompatProvider::build_body(&req);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "run_code");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parse_tool_call_without_id() {
        let data = r#"{
            "choices": [{"message": {"role": "assistant", "content": null,
                "tool_calls": [{"function": {"name": "render_page", "arguments": "{\"url\":\"https://q.example\"}"}}]}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed, "gemini-2.5-flash").unwrap();
        assert_eq!(response.model, "gemini-2.5-flash");
        assert_eq!(response.message.role, Role::Assistant);
        assert_eq!(response.message.content, "");
        let call = &response.message.tool_calls[0];
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.name, "render_page");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(OpenAiCompatProvider::parse_response(parsed, "m").is_err());
    }

    #[tokio::test]
    async fn complete_against_local_server() {
        let router = Router::new().route(
            "/chat/completions",
            post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "gemini-2.5-flash");
                axum::Json(serde_json::json!({
                    "model": "gemini-2.5-flash",
                    "choices": [{"message": {"role": "assistant", "content": "END"}}]
                }))
            }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("test", base, "key");
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.message.content, "END");
        assert!(response.message.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let router = Router::new()
            .route("/limited/chat/completions", post(|| async { StatusCode::TOO_MANY_REQUESTS }))
            .route("/denied/chat/completions", post(|| async { StatusCode::UNAUTHORIZED }))
            .route(
                "/broken/chat/completions",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );
        let base = serve(router).await;

        let limited = OpenAiCompatProvider::new("t", format!("{base}/limited"), "k");
        assert!(matches!(
            limited.complete(request()).await,
            Err(ProviderError::RateLimited { .. })
        ));

        let denied = OpenAiCompatProvider::new("t", format!("{base}/denied"), "k");
        assert!(matches!(
            denied.complete(request()).await,
            Err(ProviderError::AuthenticationFailed(_))
        ));

        let broken = OpenAiCompatProvider::new("t", format!("{base}/broken"), "k");
        match broken.complete(request()).await {
            Err(ProviderError::ApiError { status_code, message }) => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
