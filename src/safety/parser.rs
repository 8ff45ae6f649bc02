//! Parser-backed read-only check.
//!
//! Uses sqlparser-rs with the connection's dialect and accepts only a single
//! query statement (or a plain EXPLAIN of one) that contains no data-modifying
//! CTE or subquery anywhere in its tree.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::{Parser, ParserError};

use crate::db::Dialect;
use crate::error::{DbQueryError, Result};

use super::ReadOnlyCheck;

/// Read-only check that parses the statement instead of scanning keywords.
///
/// Unparseable SQL is rejected.
#[derive(Debug, Clone, Copy)]
pub struct ParserGuard {
    dialect: Dialect,
}

impl ParserGuard {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    fn parse(&self, sql: &str) -> std::result::Result<Vec<Statement>, ParserError> {
        match self.dialect {
            Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
            Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
            Dialect::Mysql => Parser::parse_sql(&MySqlDialect {}, sql),
        }
    }
}

impl ReadOnlyCheck for ParserGuard {
    fn name(&self) -> &'static str {
        "parser"
    }

    fn check(&self, sql: &str) -> Result<()> {
        let statements = self.parse(sql).map_err(|e| {
            DbQueryError::not_read_only(sql, format!("generated SQL could not be parsed: {e}"))
        })?;

        match statements.as_slice() {
            [] => Err(DbQueryError::not_read_only(sql, "generated SQL is empty")),
            [statement] if is_read_only_statement(statement) => Ok(()),
            [_] => Err(DbQueryError::not_read_only(
                sql,
                "generated SQL is not read-only; use --allow-write to permit non-SELECT statements",
            )),
            _ => Err(DbQueryError::not_read_only(
                sql,
                "generated SQL contains multiple statements",
            )),
        }
    }
}

fn is_read_only_statement(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => is_read_only_query(query),
        // EXPLAIN ANALYZE runs the inner statement.
        Statement::Explain {
            analyze, statement, ..
        } => !*analyze && matches!(statement.as_ref(), Statement::Query(q) if is_read_only_query(q)),
        _ => false,
    }
}

/// Walks CTEs, the body and derived tables looking for data-modifying parts.
fn is_read_only_query(query: &Query) -> bool {
    let ctes_ok = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_read_only_query(&cte.query)));

    ctes_ok && is_read_only_set_expr(&query.body)
}

fn is_read_only_set_expr(set_expr: &SetExpr) -> bool {
    match set_expr {
        SetExpr::Select(select) => is_read_only_select(select),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_set_expr(left) && is_read_only_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        SetExpr::Insert(_) | SetExpr::Update(_) => false,
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn is_read_only_select(select: &Select) -> bool {
    select.from.iter().all(is_read_only_table_with_joins)
}

fn is_read_only_table_with_joins(twj: &TableWithJoins) -> bool {
    is_read_only_table_factor(&twj.relation)
        && twj
            .joins
            .iter()
            .all(|join| is_read_only_table_factor(&join.relation))
}

fn is_read_only_table_factor(factor: &TableFactor) -> bool {
    match factor {
        TableFactor::Derived { subquery, .. } => is_read_only_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => is_read_only_table_with_joins(table_with_joins),
        _ => true,
    }
}
