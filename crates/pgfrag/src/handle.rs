//! Query handles: a fragment bound to an endpoint and a result shape.
//!
//! Terminal operations consume the handle:
//! - [`QueryHandle::stream`] returns a lazy [`MappedStream`],
//! - [`QueryHandle::list`] drains it into a `Vec`,
//! - [`QueryHandle::optional`] expects at most one row,
//! - [`QueryHandle::execute`] runs an update, or defers it when a batch is open.
//!
//! Composition (`and`, `or`, `concat`, `substitute`) returns a new handle sharing the
//! endpoint and shape.

use crate::batch;
use crate::diagnostics::{self, Probe};
use crate::endpoint::Endpoint;
use crate::error::{FragError, FragResult};
use crate::executor::{RecordStream, StatementKind};
use crate::fragment::{Substitutions, SqlFragment};
use crate::guard;
use crate::materialize::ResultShape;
use crate::record::Record;
use futures_core::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// A fragment ready to run against an endpoint.
#[must_use]
pub struct QueryHandle<T> {
    fragment: SqlFragment,
    endpoint: Endpoint,
    shape: ResultShape<T>,
}

impl<T> Clone for QueryHandle<T> {
    fn clone(&self) -> Self {
        Self {
            fragment: self.fragment.clone(),
            endpoint: self.endpoint.clone(),
            shape: self.shape.clone(),
        }
    }
}

impl<T> fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("endpoint", &self.endpoint.name())
            .field("sql", &self.fragment.sql())
            .field("shape", &self.shape)
            .finish()
    }
}

impl<T> From<QueryHandle<T>> for SqlFragment {
    fn from(handle: QueryHandle<T>) -> Self {
        handle.fragment
    }
}

impl<T> QueryHandle<T> {
    pub fn new(fragment: SqlFragment, endpoint: Endpoint, shape: ResultShape<T>) -> Self {
        Self {
            fragment,
            endpoint,
            shape,
        }
    }

    pub fn fragment(&self) -> &SqlFragment {
        &self.fragment
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn shape(&self) -> &ResultShape<T> {
        &self.shape
    }

    /// SQL as it will be sent to the endpoint's executor.
    pub fn rendered_sql(&self) -> String {
        self.fragment.render(self.endpoint.executor().param_style())
    }

    /// Keep bound values out of diagnostics.
    pub fn confidential(mut self) -> Self {
        self.fragment = self.fragment.confidential();
        self
    }

    pub fn is_confidential(&self) -> bool {
        self.fragment.is_confidential()
    }

    pub fn and(self, other: impl Into<SqlFragment>) -> Self {
        self.map_fragment(|f| f.and(other.into()))
    }

    pub fn or(self, other: impl Into<SqlFragment>) -> Self {
        self.map_fragment(|f| f.or(other.into()))
    }

    pub fn concat(self, other: impl Into<SqlFragment>) -> Self {
        self.map_fragment(|f| f.concat(other.into()))
    }

    pub fn concat_with(self, separator: &str, other: impl Into<SqlFragment>) -> Self {
        self.map_fragment(|f| f.concat_with(separator, other.into()))
    }

    pub fn substitute(self, substitutions: &Substitutions) -> FragResult<Self> {
        let fragment = self.fragment.substitute(substitutions)?;
        Ok(Self { fragment, ..self })
    }

    /// Same statement, different result shape.
    pub fn with_shape<U>(self, shape: ResultShape<U>) -> QueryHandle<U> {
        QueryHandle {
            fragment: self.fragment,
            endpoint: self.endpoint,
            shape,
        }
    }

    fn map_fragment(self, f: impl FnOnce(SqlFragment) -> SqlFragment) -> Self {
        Self {
            fragment: f(self.fragment),
            ..self
        }
    }

    /// Stream rows mapped through the handle's shape.
    pub async fn stream(self) -> FragResult<MappedStream<T>> {
        let Self {
            fragment,
            endpoint,
            shape,
        } = self;
        open_stream(fragment, endpoint, shape).await
    }

    /// Stream rows mapped through `f` instead of the handle's shape.
    pub async fn stream_map<U>(
        self,
        f: impl Fn(&Record) -> FragResult<U> + Send + Sync + 'static,
    ) -> FragResult<MappedStream<U>> {
        open_stream(self.fragment, self.endpoint, ResultShape::mapper(f)).await
    }

    pub async fn list(self) -> FragResult<Vec<T>> {
        self.stream().await?.collect_vec().await
    }

    pub async fn list_map<U>(
        self,
        f: impl Fn(&Record) -> FragResult<U> + Send + Sync + 'static,
    ) -> FragResult<Vec<U>> {
        self.stream_map(f).await?.collect_vec().await
    }

    /// At most one row: `None` for zero rows, [`FragError::TooManyResults`] for more than one.
    pub async fn optional(self) -> FragResult<Option<T>> {
        at_most_one(self.list().await?)
    }

    pub async fn optional_map<U>(
        self,
        f: impl Fn(&Record) -> FragResult<U> + Send + Sync + 'static,
    ) -> FragResult<Option<U>> {
        at_most_one(self.list_map(f).await?)
    }

    /// Run the statement and return the affected row count.
    ///
    /// Inside [`run_batch`](crate::run_batch) the statement is queued instead and `0` is
    /// returned; it runs when the batch flushes.
    pub async fn execute(self) -> FragResult<u64> {
        ensure_confined(&self.fragment)?;
        let rendered = self.rendered_sql();
        if batch::in_batch() {
            batch::register(&self.endpoint, rendered, &self.fragment)?;
            return Ok(0);
        }

        let params = self.fragment.params();
        let probe = Probe::start(self.endpoint.diagnostics());
        let result = self.endpoint.executor().update(&rendered, &params).await;
        if let Some(probe) = probe {
            let preview = diagnostics::preview(
                &self.fragment,
                self.endpoint.diagnostics().max_preview_values,
            );
            probe.finish(
                self.endpoint.diagnostics(),
                self.endpoint.executor(),
                self.endpoint.name(),
                StatementKind::Update,
                &self.fragment.original(),
                &rendered,
                self.fragment.is_confidential(),
                &preview,
                result.as_ref().ok().copied(),
                result.as_ref().err(),
            );
        }
        result
    }
}

fn at_most_one<T>(mut rows: Vec<T>) -> FragResult<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        count => Err(FragError::TooManyResults { count }),
    }
}

/// Fail when a fragment with single-use values escapes its guarded scope.
fn ensure_confined(fragment: &SqlFragment) -> FragResult<()> {
    if !fragment.contains_non_thread_safe_value() || guard::in_single_threaded_scope() {
        return Ok(());
    }
    let offending = fragment.placeholders().find(|p| !p.is_thread_safe());
    Err(FragError::NonThreadSafeViolation {
        placeholder: offending.map(|p| p.name().to_string()).unwrap_or_default(),
        type_name: offending
            .map(|p| p.bound_type().name().to_string())
            .unwrap_or_default(),
    })
}

async fn open_stream<T>(
    fragment: SqlFragment,
    endpoint: Endpoint,
    shape: ResultShape<T>,
) -> FragResult<MappedStream<T>> {
    ensure_confined(&fragment)?;
    let rendered = fragment.render(endpoint.executor().param_style());
    let params = fragment.params();
    let probe = Probe::start(endpoint.diagnostics());
    let opened = endpoint.executor().query_stream(&rendered, &params).await;

    let report = probe.map(|probe| PendingReport {
        probe,
        preview: diagnostics::preview(&fragment, endpoint.diagnostics().max_preview_values),
        original: fragment.original(),
        rendered,
        confidential: fragment.is_confidential(),
        endpoint,
    });

    match opened {
        Ok(inner) => Ok(MappedStream {
            inner: Some(inner),
            shape,
            report,
            rows: 0,
        }),
        Err(e) => {
            if let Some(report) = report {
                report.finish(0, Some(&e));
            }
            Err(e)
        }
    }
}

struct PendingReport {
    probe: Probe,
    endpoint: Endpoint,
    original: String,
    rendered: String,
    confidential: bool,
    preview: String,
}

impl PendingReport {
    fn finish(self, rows: u64, error: Option<&FragError>) {
        self.probe.finish(
            self.endpoint.diagnostics(),
            self.endpoint.executor(),
            self.endpoint.name(),
            StatementKind::Query,
            &self.original,
            &self.rendered,
            self.confidential,
            &self.preview,
            Some(rows),
            error,
        );
    }
}

/// Lazy, single-pass stream of mapped rows.
///
/// Rows are fetched only when pulled. The cursor is released when the stream ends,
/// fails, or is dropped, whichever comes first; diagnostics are reported at that point.
#[must_use = "streams do nothing unless polled"]
pub struct MappedStream<T> {
    inner: Option<RecordStream>,
    shape: ResultShape<T>,
    report: Option<PendingReport>,
    rows: u64,
}

impl<T> Unpin for MappedStream<T> {}

impl<T> MappedStream<T> {
    /// Pull the next row.
    pub async fn next(&mut self) -> Option<FragResult<T>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Rows pulled so far.
    pub fn rows_read(&self) -> u64 {
        self.rows
    }

    /// Whether the cursor has been released.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the cursor now.
    pub fn close(&mut self) {
        self.release(None);
    }

    async fn collect_vec(mut self) -> FragResult<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    fn release(&mut self, error: Option<&FragError>) {
        self.inner = None;
        if let Some(report) = self.report.take() {
            report.finish(self.rows, error);
        }
    }
}

impl<T> Stream for MappedStream<T> {
    type Item = FragResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = match ready!(inner.as_mut().poll_next(cx)) {
            Some(Ok(record)) => {
                this.rows += 1;
                this.shape.materialize(&record)
            }
            Some(Err(e)) => Err(e),
            None => {
                this.release(None);
                return Poll::Ready(None);
            }
        };
        if let Err(e) = &item {
            this.release(Some(e));
        }
        Poll::Ready(Some(item))
    }
}

impl<T> Drop for MappedStream<T> {
    fn drop(&mut self) {
        self.release(None);
    }
}
