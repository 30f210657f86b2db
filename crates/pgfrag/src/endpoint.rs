use crate::diagnostics::DiagnosticsConfig;
use crate::error::FragResult;
use crate::executor::Executor;
use crate::fragment::{Bindings, SqlFragment};
use crate::handle::QueryHandle;
use crate::materialize::ResultShape;
use crate::record::{FromRecord, Record};
use std::fmt;
use std::sync::Arc;

/// A named backend: an executor plus its diagnostics settings.
///
/// Cheap to clone. Batches group statements by endpoint name, so two endpoints with
/// the same name are treated as one target.
///
/// # Example
///
/// ```ignore
/// let main = Endpoint::new("main", PoolExecutor::new(pool))
///     .with_diagnostics(DiagnosticsConfig::new().enable());
///
/// let users = main
///     .sql("SELECT id, username FROM users WHERE status = :status", &bindings! { "status" => "active" })?
///     .list()
///     .await?;
/// ```
#[derive(Clone)]
pub struct Endpoint {
    name: Arc<str>,
    executor: Arc<dyn Executor>,
    diagnostics: Arc<DiagnosticsConfig>,
}

impl Endpoint {
    pub fn new(name: impl Into<Arc<str>>, executor: impl Executor + 'static) -> Self {
        Self::from_arc(name, Arc::new(executor))
    }

    pub fn from_arc(name: impl Into<Arc<str>>, executor: Arc<dyn Executor>) -> Self {
        Self {
            name: name.into(),
            executor,
            diagnostics: Arc::new(DiagnosticsConfig::default()),
        }
    }

    pub fn with_diagnostics(mut self, config: DiagnosticsConfig) -> Self {
        self.diagnostics = Arc::new(config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor(&self) -> &dyn Executor {
        &*self.executor
    }

    pub fn diagnostics(&self) -> &DiagnosticsConfig {
        &self.diagnostics
    }

    /// Handle producing values of `T` through `shape`.
    pub fn query<T>(&self, fragment: SqlFragment, shape: ResultShape<T>) -> QueryHandle<T> {
        QueryHandle::new(fragment, self.clone(), shape)
    }

    /// Handle producing a [`FromRecord`] type.
    pub fn query_as<T: FromRecord + 'static>(&self, fragment: SqlFragment) -> QueryHandle<T> {
        self.query(fragment, ResultShape::from_record())
    }

    /// Handle producing raw records.
    pub fn records(&self, fragment: SqlFragment) -> QueryHandle<Record> {
        self.query_as(fragment)
    }

    /// Build a fragment from `template` and wrap it in a record handle.
    pub fn sql(&self, template: &str, bindings: &Bindings) -> FragResult<QueryHandle<Record>> {
        Ok(self.records(SqlFragment::new(template, bindings)?))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}
