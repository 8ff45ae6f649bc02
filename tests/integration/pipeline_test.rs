//! End-to-end pipeline tests against a real SQLite database.
//!
//! The LLM is replaced by the mock client; everything else is the real stack.

use super::{create_sqlite_file, seeded_sqlite};
use dbquery::config::{Config, Overrides, Settings};
use dbquery::db::{
    build_schema_context, connect, DatabaseClient, Introspector, TableFilter, Value,
};
use dbquery::error::DbQueryError;
use dbquery::llm::MockLlmClient;
use dbquery::persistence::HistoryLog;
use dbquery::query::{PipelineOptions, QueryPipeline, RunMode};
use dbquery::render::OutputFormat;
use dbquery::safety::GuardKind;
use tempfile::TempDir;

#[tokio::test]
async fn test_pipeline_runs_generated_sql() {
    let (dir, client) = seeded_sqlite().await;
    let history = HistoryLog::new(dir.path().join("history.jsonl"));
    let llm = MockLlmClient::new().with_response(
        "emails",
        "```sql\nSELECT id, email FROM users ORDER BY id\n```",
    );
    let context = build_schema_context(client.as_ref(), &TableFilter::default(), 40, None)
        .await
        .unwrap();

    let pipeline = QueryPipeline::new(
        client.as_ref(),
        &llm,
        GuardKind::Keyword.build(client.dialect()),
        &context,
        PipelineOptions {
            limit: 2,
            ..Default::default()
        },
    )
    .with_history(Some(&history));

    let mut out = Vec::new();
    let outcome = pipeline.run("list user emails", &mut out).await.unwrap();

    assert_eq!(outcome.sql, "SELECT id, email FROM users ORDER BY id LIMIT 2;");
    let result = outcome.result.unwrap();
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.rows[1].get("id"), Some(&Value::Int(2)));

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("| sam@example.com |"), "{printed}");

    let requests = llm.requests();
    let prompt = &requests[0][1].content;
    assert!(prompt.contains("- users (id"), "{prompt}");
    assert!(prompt.contains("- orders (id"), "{prompt}");

    let entries = history.read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].db_type, "sqlite");
    assert_eq!(entries[0].rows, 2);
    assert_eq!(entries[0].sql.as_deref(), Some(outcome.sql.as_str()));
}

#[tokio::test]
async fn test_pipeline_parser_guard_rejects_multi_statement() {
    let (_dir, client) = seeded_sqlite().await;
    let llm = MockLlmClient::new().with_response(
        "sneaky",
        "SELECT * FROM users; DELETE FROM users",
    );

    let pipeline = QueryPipeline::new(
        client.as_ref(),
        &llm,
        GuardKind::Parser.build(client.dialect()),
        "",
        PipelineOptions::default(),
    );

    let err = pipeline.run("sneaky", &mut Vec::new()).await.unwrap_err();
    assert!(matches!(err, DbQueryError::NotReadOnly { .. }));

    let count = client
        .execute_query("SELECT COUNT(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(count.rows[0].get("n"), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_pipeline_json_output_file() {
    let (dir, client) = seeded_sqlite().await;
    let out_path = dir.path().join("orders.json");
    let llm = MockLlmClient::new().with_response(
        "biggest order",
        "SELECT id, total FROM orders ORDER BY total DESC LIMIT 1",
    );

    let pipeline = QueryPipeline::new(
        client.as_ref(),
        &llm,
        GuardKind::Keyword.build(client.dialect()),
        "",
        PipelineOptions {
            mode: RunMode::Chat,
            output: OutputFormat::Json,
            output_file: Some(out_path.clone()),
            ..Default::default()
        },
    );

    let outcome = pipeline.run("biggest order", &mut Vec::new()).await.unwrap();

    // An explicit LIMIT is left alone.
    assert_eq!(outcome.sql, "SELECT id, total FROM orders ORDER BY total DESC LIMIT 1");
    assert_eq!(
        std::fs::read_to_string(&out_path).unwrap(),
        "[\n  {\n    \"id\": 12,\n    \"total\": 30.0\n  }\n]"
    );
}

#[tokio::test]
async fn test_settings_from_profile_connect() {
    let dir = TempDir::new().unwrap();
    let db_path = create_sqlite_file(dir.path()).await;
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[llm]\napi_key = \"sk-test\"\n\n\
             [defaults]\nlimit = 3\noutput = \"json\"\n\n\
             [profiles.local]\ndb_url = {db_path:?}\ntables = [\"orders\"]\n"
        ),
    )
    .unwrap();

    let config = Config::load_from_file(&config_path).unwrap();
    let overrides = Overrides {
        profile: Some("local".to_string()),
        no_history: true,
        ..Default::default()
    };
    let settings = Settings::resolve_with_env(&config, &overrides, |_| None).unwrap();

    assert_eq!(settings.limit, 3);
    assert_eq!(settings.output, OutputFormat::Json);
    assert_eq!(settings.history_file, None);
    assert_eq!(settings.llm.require_api_key().unwrap(), "sk-test");

    let client = connect(&settings.connection).await.unwrap();
    let context = build_schema_context(
        client.as_ref(),
        &TableFilter::new(&settings.tables),
        settings.schema_max_tables,
        None,
    )
    .await
    .unwrap();
    assert!(context.contains("- orders ("), "{context}");
    assert!(!context.contains("- users ("), "{context}");
}
