//! The oracle's action vocabulary.
//!
//! Every tool call the model emits decodes into one [`ToolAction`]; every
//! assistant message decodes into one [`Decision`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::message::{Message, MessageToolCall};

pub const RENDER_PAGE: &str = "render_page";
pub const DOWNLOAD_FILE: &str = "download_file";
pub const INTERPRET_FILE: &str = "interpret_file";
pub const RUN_CODE: &str = "run_code";
pub const ADD_DEPENDENCIES: &str = "add_dependencies";
pub const SUBMIT_ANSWER: &str = "submit_answer";
pub const STOP: &str = "stop";

/// The reply text that ends a run.
pub const STOP_SENTINEL: &str = "END";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderArgs {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchArgs {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretArgs {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FileKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCodeArgs {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallArgs {
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitArgs {
    pub url: String,
    pub payload: serde_json::Value,
}

/// Attachment formats the interpreter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Csv,
}

impl FileKind {
    /// Infer the kind from a path or URL extension (case-insensitive).
    pub fn from_extension(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.')?.1;
        let ext = ext.split(['?', '#']).next().unwrap_or(ext);
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// One decoded tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments")]
pub enum ToolAction {
    #[serde(rename = "render_page")]
    Render(RenderArgs),
    #[serde(rename = "download_file")]
    Fetch(FetchArgs),
    #[serde(rename = "interpret_file")]
    Interpret(InterpretArgs),
    #[serde(rename = "run_code")]
    RunCode(RunCodeArgs),
    #[serde(rename = "add_dependencies")]
    InstallDependency(InstallArgs),
    #[serde(rename = "submit_answer")]
    Submit(SubmitArgs),
    #[serde(rename = "stop")]
    Stop,
}

impl ToolAction {
    /// Decode a tool call by name and JSON arguments.
    pub fn decode(name: &str, arguments: &serde_json::Value) -> Result<Self, ToolError> {
        let action = match name {
            STOP => Self::Stop,
            RENDER_PAGE => Self::Render(parse_args(name, arguments.clone())?),
            DOWNLOAD_FILE => Self::Fetch(parse_args(name, arguments.clone())?),
            INTERPRET_FILE => Self::Interpret(parse_args(name, arguments.clone())?),
            RUN_CODE => Self::RunCode(parse_args(name, arguments.clone())?),
            ADD_DEPENDENCIES => Self::InstallDependency(parse_args(name, arguments.clone())?),
            SUBMIT_ANSWER => Self::Submit(parse_args(name, arguments.clone())?),
            other => return Err(ToolError::NotFound(other.to_string())),
        };
        Ok(action)
    }

    /// Decode the raw call carried on an assistant message.
    ///
    /// Empty argument strings are treated as `{}`.
    pub fn from_message_call(call: &MessageToolCall) -> Result<Self, ToolError> {
        let arguments = parse_raw_arguments(&call.name, &call.arguments)?;
        Self::decode(&call.name, &arguments)
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Render(_) => RENDER_PAGE,
            Self::Fetch(_) => DOWNLOAD_FILE,
            Self::Interpret(_) => INTERPRET_FILE,
            Self::RunCode(_) => RUN_CODE,
            Self::InstallDependency(_) => ADD_DEPENDENCIES,
            Self::Submit(_) => SUBMIT_ANSWER,
            Self::Stop => STOP,
        }
    }
}

/// Parse a tool's JSON arguments into its typed argument struct.
pub fn parse_args<T: DeserializeOwned>(tool: &str, arguments: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

/// Parse the JSON-encoded argument string of a raw tool call.
pub fn parse_raw_arguments(tool: &str, raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

/// What the oracle decided in one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Execute these tool calls, in order.
    Act(Vec<MessageToolCall>),
    /// The reply was the stop sentinel.
    Stop,
    /// Free text: the oracle is thinking aloud and gets another step.
    Think(String),
}

impl Decision {
    pub fn from_message(message: &Message) -> Self {
        if !message.tool_calls.is_empty() {
            return Self::Act(message.tool_calls.clone());
        }
        if message.content.trim() == STOP_SENTINEL {
            return Self::Stop;
        }
        Self::Think(message.content.clone())
    }
}
