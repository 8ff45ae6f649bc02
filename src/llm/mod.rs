//! LLM integration for dbquery.
//!
//! Turns a natural-language request plus schema context into a single SQL
//! statement through an OpenAI-compatible chat completions API.

pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod types;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::normalize_sql;
pub use prompt::{build_messages, build_system_prompt, build_user_prompt, PromptOptions};
pub use types::{Message, Role};

use async_trait::async_trait;

use crate::error::Result;

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    ///
    /// Returns the complete response as a single string.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}
