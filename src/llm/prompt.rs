//! Prompt construction for SQL generation.

use crate::db::Dialect;
use crate::llm::types::Message;

/// What the model is told about the target database and the run.
#[derive(Debug, Clone, Copy)]
pub struct PromptOptions {
    pub dialect: Dialect,
    pub limit: i64,
    pub allow_write: bool,
}

/// Builds the system prompt for the given dialect and mode.
pub fn build_system_prompt(options: &PromptOptions) -> String {
    let mode_line = if options.allow_write {
        "Generate one SQL query matching the request."
    } else {
        "Generate one read-only SQL query."
    };

    [
        "You are a senior SQL engineer.".to_string(),
        "Translate user requests into valid SQL for the specified dialect.".to_string(),
        mode_line.to_string(),
        "Use only schema shown in the context.".to_string(),
        "Return only raw SQL. No markdown, no explanation, no backticks.".to_string(),
        format!("Target dialect: {}.", options.dialect),
        format!(
            "Target row limit: {} unless user asks for another limit.",
            options.limit
        ),
    ]
    .join("\n")
}

/// Builds the user prompt carrying the request and the schema context.
pub fn build_user_prompt(request: &str, schema_context: &str) -> String {
    format!("User request:\n{request}\n\nSchema context:\n{schema_context}\n")
}

/// Builds the full message list for one SQL generation request.
pub fn build_messages(options: &PromptOptions, request: &str, schema_context: &str) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(options)),
        Message::user(build_user_prompt(request, schema_context)),
    ]
}
