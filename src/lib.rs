//! dbquery - ask a SQL database questions in plain language.
//!
//! This library exposes the core modules for use by the binary and
//! integration tests.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod manage;
pub mod persistence;
pub mod query;
pub mod render;
pub mod safety;
