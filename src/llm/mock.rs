//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::error::{DbQueryError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned SQL based on the request text.
///
/// Used for unit and integration testing without making real API calls.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked in order.
    custom_responses: Vec<(String, String)>,
    /// When set, every call fails with this message.
    failure: Option<String>,
    /// Every message list the client was asked to complete.
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the request contains `pattern`, the mock will return `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Makes every completion fail with an LLM error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Message lists received so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<Message>>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        if input_lower.contains("all users") || input_lower.contains("show users") {
            return "```sql\nSELECT * FROM users;\n```".to_string();
        }

        if input_lower.contains("count") && input_lower.contains("orders") {
            return "```sql\nSELECT COUNT(*) AS count FROM orders;\n```".to_string();
        }

        if input_lower.contains("count") && input_lower.contains("users") {
            return "```sql\nSELECT COUNT(*) AS count FROM users;\n```".to_string();
        }

        if input_lower.contains("delete") && input_lower.contains("user") {
            return "```sql\nDELETE FROM users WHERE id = 1;\n```".to_string();
        }

        "SELECT 1".to_string()
    }

    /// The request line of the last user message.
    ///
    /// Only the text between `User request:` and the schema context is
    /// matched, so table names in the schema never trigger a pattern.
    fn extract_user_input(messages: &[Message]) -> String {
        let content = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let request = content.strip_prefix("User request:\n").unwrap_or(content);
        request
            .split("\n\nSchema context:")
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.lock().push(messages.to_vec());

        if let Some(message) = &self.failure {
            return Err(DbQueryError::llm(message.clone()));
        }

        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}
