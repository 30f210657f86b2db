//! In-memory executor for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_core::Stream;
use pgfrag::{
    Endpoint, Executor, FragError, FragResult, ParamStyle, Record, RecordStream, StatementKind,
    StatementLog, Value,
};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Update { sql: String, params: Vec<Value> },
    Query { sql: String, params: Vec<Value> },
    Batch { sql: String, rows: Vec<Vec<Value>> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatement {
    pub kind: StatementKind,
    pub endpoint: String,
    pub original_sql: String,
    pub rendered_sql: String,
    pub preview: String,
    pub rows: Option<u64>,
    pub error: Option<String>,
}

#[derive(Default)]
struct State {
    calls: Mutex<Vec<Call>>,
    results: Mutex<VecDeque<Vec<Record>>>,
    logs: Mutex<Vec<LoggedStatement>>,
    fail_batch_containing: Mutex<Option<String>>,
    open_streams: AtomicUsize,
    pulled: AtomicUsize,
}

/// Records every call; queries return queued result sets in order.
#[derive(Clone)]
pub struct MemoryExecutor {
    state: Arc<State>,
    style: ParamStyle,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::default()),
            style: ParamStyle::Numbered,
        }
    }

    pub fn with_style(mut self, style: ParamStyle) -> Self {
        self.style = style;
        self
    }

    pub fn endpoint(&self, name: &str) -> Endpoint {
        Endpoint::new(name, self.clone())
    }

    /// Queue the rows returned by the next query.
    pub fn push_result(&self, rows: Vec<Record>) {
        self.state.results.lock().unwrap().push_back(rows);
    }

    /// Make batch calls whose SQL contains `needle` fail.
    pub fn fail_batches_containing(&self, needle: &str) {
        *self.state.fail_batch_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<LoggedStatement> {
        self.state.logs.lock().unwrap().clone()
    }

    pub fn open_streams(&self) -> usize {
        self.state.open_streams.load(Ordering::SeqCst)
    }

    /// Rows handed out by all streams so far.
    pub fn pulled(&self) -> usize {
        self.state.pulled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    fn param_style(&self) -> ParamStyle {
        self.style
    }

    async fn batch_update(&self, sql: &str, rows: &[Vec<Value>]) -> FragResult<Vec<u64>> {
        self.state.calls.lock().unwrap().push(Call::Batch {
            sql: sql.to_string(),
            rows: rows.to_vec(),
        });
        let fail = self.state.fail_batch_containing.lock().unwrap().clone();
        if let Some(needle) = fail {
            if sql.contains(&needle) {
                return Err(FragError::Other(format!("batch failed: {sql}")));
            }
        }
        Ok(vec![1; rows.len()])
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> FragResult<RecordStream> {
        self.state.calls.lock().unwrap().push(Call::Query {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        let rows = self
            .state
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        self.state.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(MemoryRows {
            rows: rows.into(),
            state: self.state.clone(),
        }))
    }

    async fn update(&self, sql: &str, params: &[Value]) -> FragResult<u64> {
        self.state.calls.lock().unwrap().push(Call::Update {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(1)
    }

    fn log_statement(&self, log: &StatementLog<'_>) {
        self.state.logs.lock().unwrap().push(LoggedStatement {
            kind: log.kind,
            endpoint: log.endpoint.to_string(),
            original_sql: log.original_sql.to_string(),
            rendered_sql: log.rendered_sql.to_string(),
            preview: log.preview.to_string(),
            rows: log.rows,
            error: log.error.map(str::to_string),
        });
    }
}

struct MemoryRows {
    rows: VecDeque<Record>,
    state: Arc<State>,
}

impl Stream for MemoryRows {
    type Item = FragResult<Record>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = this.rows.pop_front();
        if next.is_some() {
            this.state.pulled.fetch_add(1, Ordering::SeqCst);
        }
        Poll::Ready(next.map(Ok))
    }
}

impl Drop for MemoryRows {
    fn drop(&mut self) {
        self.state.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn user(id: i64, name: &str) -> Record {
    Record::from_pairs([("id", Value::BigInt(id)), ("name", Value::from(name))])
}
