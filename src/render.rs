//! Result rendering for dbquery.
//!
//! Turns a column list and rows into either an ASCII table for people or
//! pretty-printed JSON for tools.

use crate::db::{Row, Value};
use crate::error::{DbQueryError, Result};
use std::fmt;
use std::str::FromStr;

/// Supported output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Bordered ASCII table.
    #[default]
    Table,
    /// Indented JSON array of row objects.
    Json,
}

impl FromStr for OutputFormat {
    type Err = DbQueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(DbQueryError::unsupported_format(format!(
                "{s:?} (expected table|json)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Renders rows in the named format.
pub fn render(format: &str, columns: &[String], rows: &[Row]) -> Result<String> {
    render_as(format.parse()?, columns, rows)
}

/// Renders rows in an already-parsed format.
pub fn render_as(format: OutputFormat, columns: &[String], rows: &[Row]) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows)
            .map_err(|e| DbQueryError::internal(format!("marshal json output: {e}"))),
        OutputFormat::Table => Ok(render_table(columns, rows)),
    }
}

/// Renders an ASCII table.
///
/// No columns gives a one-line message; no rows gives the empty frame and a
/// `(0 rows)` footer.
pub fn render_table(columns: &[String], rows: &[Row]) -> String {
    if columns.is_empty() {
        return "No rows returned.".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| display_width(c)).collect();

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = format_cell(row.get(column));
                    widths[i] = widths[i].max(display_width(&cell));
                    cell
                })
                .collect()
        })
        .collect();

    let border = horizontal_line(&widths);
    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    out.push_str(&table_row(columns, &widths));
    out.push('\n');
    out.push_str(&border);
    out.push('\n');

    for line in &cells {
        out.push_str(&table_row(line, &widths));
        out.push('\n');
    }

    out.push_str(&border);
    if rows.is_empty() {
        out.push_str("\n(0 rows)");
    }

    out
}

fn display_width(s: &str) -> usize {
    s.chars().count()
}

fn horizontal_line(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

fn table_row<S: AsRef<str>>(values: &[S], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (value, width) in values.iter().zip(widths) {
        let value = value.as_ref();
        line.push(' ');
        line.push_str(value);
        line.push_str(&" ".repeat(width.saturating_sub(display_width(value))));
        line.push_str(" |");
    }
    line
}

/// A missing cell renders like NULL.
fn format_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(value) => value.to_display_string().replace(['\n', '\r'], " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn sam() -> Vec<Row> {
        vec![Row::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("sam")),
        ])]
    }

    #[test]
    fn test_render_json() {
        let out = render("json", &columns(&["id", "name"]), &sam()).unwrap();
        assert!(out.contains(r#""id": 1"#), "{out}");
        assert!(out.contains(r#""name": "sam""#), "{out}");
        assert_eq!(out, "[\n  {\n    \"id\": 1,\n    \"name\": \"sam\"\n  }\n]");
    }

    #[test]
    fn test_render_json_keeps_column_order_and_null() {
        let rows = vec![Row::from_pairs([
            ("z", Value::Null),
            ("a", Value::Bool(true)),
        ])];
        let out = render("json", &columns(&["z", "a"]), &rows).unwrap();
        assert_eq!(out, "[\n  {\n    \"z\": null,\n    \"a\": true\n  }\n]");
    }

    #[test]
    fn test_render_json_empty() {
        assert_eq!(render("json", &columns(&["id"]), &[]).unwrap(), "[]");
    }

    #[test]
    fn test_render_table() {
        let out = render("table", &columns(&["id", "name"]), &sam()).unwrap();
        assert_eq!(
            out,
            "+----+------+\n\
             | id | name |\n\
             +----+------+\n\
             | 1  | sam  |\n\
             +----+------+"
        );
        assert!(out.contains("| id"));
        assert!(out.contains("| name"));
        assert!(out.contains("sam"));
    }

    #[test]
    fn test_render_table_cells() {
        let rows = vec![Row::from_pairs([
            ("note", Value::from("line one\nline two\r")),
            ("empty", Value::from("")),
            ("missing", Value::Null),
            ("ratio", Value::Float(0.5)),
        ])];
        let out = render_table(&columns(&["note", "empty", "missing", "ratio"]), &rows);
        assert_eq!(
            out,
            "+--------------------+-------+---------+-------+\n\
             | note               | empty | missing | ratio |\n\
             +--------------------+-------+---------+-------+\n\
             | line one line two  |       | NULL    | 0.5   |\n\
             +--------------------+-------+---------+-------+"
        );
    }

    #[test]
    fn test_render_table_unicode_width() {
        let rows = vec![Row::from_pairs([("city", Value::from("Zürich"))])];
        let out = render_table(&columns(&["city"]), &rows);
        assert_eq!(
            out,
            "+--------+\n| city   |\n+--------+\n| Zürich |\n+--------+"
        );
    }

    #[test]
    fn test_render_table_no_rows() {
        let out = render("table", &columns(&["id", "name"]), &[]).unwrap();
        assert_eq!(
            out,
            "+----+------+\n| id | name |\n+----+------+\n+----+------+\n(0 rows)"
        );
    }

    #[test]
    fn test_render_table_no_columns() {
        assert_eq!(render("table", &[], &[]).unwrap(), "No rows returned.");
    }

    #[test]
    fn test_render_unsupported_format() {
        let err = render("xml", &columns(&["id"]), &sam()).unwrap_err();
        assert!(matches!(err, DbQueryError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::default().to_string(), "table");
    }
}
