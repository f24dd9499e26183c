//! LLM Provider implementations for quizpilot.
//!
//! All providers implement the `quizpilot_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod rate_limit;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use rate_limit::{RateLimitedProvider, TokenBucket};
pub use router::{ProviderRouter, build_from_config};
