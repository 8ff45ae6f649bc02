//! Natural-language query execution for dbquery.
//!
//! This module ties the LLM, the safety guard, the database client and the
//! renderer together for a single request.

pub mod pipeline;

pub use pipeline::{PipelineOptions, PipelineOutcome, QueryPipeline, RunMode};
