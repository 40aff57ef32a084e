//! The managed backend boundary: tenant-filtered reads and writes over named
//! tables plus a server-pushed change feed.
//!
//! Rows cross this boundary as untyped JSON objects. Typed entities only exist
//! above it, after decoding in the store layer.

use serde_json::Value;
use thiserror::Error;

pub mod channel;
pub mod filter;
pub mod instrumented;
pub mod sqlite;

pub use channel::{ChangeEvent, ChangeHub, ChangeKind, Channel, ChannelSpec};
pub use filter::FilterExpr;
pub use instrumented::InstrumentedBackend;
pub use sqlite::SqliteBackend;

pub type Row = serde_json::Map<String, Value>;

/// Postgres code for a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";
/// Postgres code for malformed input text, used for bad filter expressions.
pub const INVALID_TEXT: &str = "22P02";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("unique constraint {constraint} violated on column {column}")]
    Conflict { constraint: String, column: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn rejected(code: &str, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            BackendError::Rejected { code, .. } => code,
            BackendError::Conflict { .. } => UNIQUE_VIOLATION,
            BackendError::Unavailable(_) => "unavailable",
        }
    }
}

/// Escape character for `ILike` patterns.
pub const LIKE_ESCAPE: char = '\\';

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    /// Case-insensitive match; `%` and `_` are wildcards, escaped with
    /// `LIKE_ESCAPE`.
    ILike(String, String),
    /// Matches when any of the inner filters does.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    /// Case-insensitive substring match. `%` and `_` in `needle` match
    /// themselves.
    pub fn contains(column: &str, needle: &str) -> Self {
        Filter::ILike(column.to_string(), format!("%{}%", escape_like(needle)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Order {
    Asc(String),
    Desc(String),
}

/// A read against one table, built fluently.
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.filters.push(Filter::ILike(column.to_string(), pattern.to_string()));
        self
    }

    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.filters.push(Filter::Or(filters));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order.push(Order::Asc(column.to_string()));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order.push(Order::Desc(column.to_string()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Everything the synchronization layer needs from the hosted backend.
///
/// Writes return the affected rows as stored, including generated columns.
/// Every committed write is published on the change feed to matching
/// channels after the write is durable.
pub trait Backend: Send + Sync {
    fn select(&self, query: &Select) -> Result<Vec<Row>, BackendError>;

    fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError>;

    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, BackendError>;

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, BackendError>;

    /// Opens a change-feed channel. The channel is closed when the returned
    /// handle is unsubscribed or dropped.
    fn channel(&self, spec: ChannelSpec) -> Result<Channel, BackendError>;

    fn open_channel_count(&self) -> usize;

    /// Sequence of the latest change published on the feed. Events with a
    /// sequence at or below it were committed before this call.
    fn last_seq(&self) -> u64;
}
