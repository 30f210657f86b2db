//! Executor port: the seam between query handles and a database driver.
//!
//! Query handles and the batch coordinator talk to an [`Executor`] only. The crate ships
//! two implementations over tokio-postgres ([`DirectExecutor`](crate::DirectExecutor) and,
//! with the `pool` feature, [`PoolExecutor`](crate::PoolExecutor)); tests and other
//! backends can provide their own.

use crate::error::FragResult;
use crate::fragment::ParamStyle;
use crate::record::Record;
use crate::value::Value;
use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::time::Duration;

/// Rows produced by [`Executor::query_stream`].
///
/// Dropping the stream releases the underlying cursor.
pub type RecordStream = Pin<Box<dyn Stream<Item = FragResult<Record>> + Send>>;

/// Statement operation, as reported to [`Executor::log_statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Update,
    Batch,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Query => "query",
            StatementKind::Update => "update",
            StatementKind::Batch => "batch",
        }
    }
}

/// One finished execution, as handed to [`Executor::log_statement`].
#[derive(Debug, Clone)]
pub struct StatementLog<'a> {
    pub kind: StatementKind,
    /// Endpoint name.
    pub endpoint: &'a str,
    /// Template text with placeholders as written.
    pub original_sql: &'a str,
    /// SQL as sent to the executor.
    pub rendered_sql: &'a str,
    pub confidential: bool,
    /// Bound value preview, already redacted when needed.
    pub preview: &'a str,
    /// Filtered call-site frames, outermost last.
    pub call_site: Option<&'a str>,
    pub elapsed: Duration,
    /// Rows returned or affected, when known.
    pub rows: Option<u64>,
    /// Whether `elapsed` exceeded the configured slow-query threshold.
    pub slow: bool,
    pub error: Option<&'a str>,
    pub level: tracing::Level,
}

/// Database access used by query handles and batches.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Marker style this executor expects in SQL text.
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Numbered
    }

    /// Run `sql` once per row of parameters; returns the affected count per row.
    async fn batch_update(&self, sql: &str, rows: &[Vec<Value>]) -> FragResult<Vec<u64>>;

    /// Run a query and return its rows lazily.
    async fn query_stream(&self, sql: &str, params: &[Value]) -> FragResult<RecordStream>;

    /// Run a statement and return the affected row count.
    async fn update(&self, sql: &str, params: &[Value]) -> FragResult<u64>;

    /// Report a finished execution. Defaults to a `tracing` event on target `pgfrag.sql`.
    fn log_statement(&self, log: &StatementLog<'_>) {
        crate::diagnostics::emit(log);
    }
}

/// Prefix `sql` with a newline so multi-line driver diagnostics start on their own line.
pub(crate) fn with_leading_newline(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 1);
    out.push('\n');
    out.push_str(sql);
    out
}
