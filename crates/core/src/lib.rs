//! # quizpilot core
//!
//! Domain types, traits, and error definitions for the quizpilot agent.
//! This crate has **no framework dependencies**: it defines the model that
//! the provider, tool, agent and gateway crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the LLM, each tool) is a trait here.
//! Implementations live in their own crates, which keeps the loop testable
//! with scripted providers and fake tools.

pub mod action;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod quiz;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{Decision, FileKind, ToolAction};
pub use error::{ProviderError, RunError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, Message, MessageToolCall, Role, RunId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use quiz::{QuizRequest, SubmissionOutcome, ValidationError, Verdict};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
