//! Persistence layer for dbquery.
//!
//! Local state is limited to the append-only query history file.

mod history;

pub use history::{
    history_columns, history_rows, HistoryEntry, HistoryLog, DEFAULT_HISTORY_LIMIT,
};
