//! Batched execution.
//!
//! Inside [`run_batch`], [`QueryHandle::execute`](crate::QueryHandle::execute) queues its
//! statement instead of running it. Queued statements are grouped by endpoint name and
//! rendered SQL; when the unit of work finishes, each group is sent as one
//! [`Executor::batch_update`](crate::Executor::batch_update) call, groups in the order
//! they were first used and rows in the order they were queued.
//!
//! The registry lives in task-local storage: it is visible to the task running the unit
//! of work only, not to tasks it spawns.
//!
//! # Example
//!
//! ```ignore
//! use pgfrag::{bindings, run_batch};
//!
//! run_batch(async {
//!     for (id, name) in rows {
//!         endpoint
//!             .sql("INSERT INTO tags (id, name) VALUES (:id, :name)", &bindings! { "id" => id, "name" => name })?
//!             .execute()
//!             .await?;
//!     }
//!     Ok::<_, FragError>(())
//! })
//! .await?;
//! ```

use crate::diagnostics::{self, Probe};
use crate::endpoint::Endpoint;
use crate::error::{FragError, FragResult};
use crate::executor::StatementKind;
use crate::fragment::SqlFragment;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

tokio::task_local! {
    static BATCH: RefCell<BatchRegistry>;
}

/// Statements queued by one batch scope.
#[derive(Default)]
struct BatchRegistry {
    groups: Vec<BatchGroup>,
    index: HashMap<(Arc<str>, String), usize>,
}

struct BatchGroup {
    endpoint: Endpoint,
    sql: String,
    original: String,
    confidential: bool,
    rows: Vec<Vec<Value>>,
}

impl BatchRegistry {
    fn push(&mut self, endpoint: &Endpoint, sql: String, fragment: &SqlFragment) {
        let key = (Arc::<str>::from(endpoint.name()), sql);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.groups.push(BatchGroup {
                    endpoint: endpoint.clone(),
                    sql: key.1.clone(),
                    original: fragment.original(),
                    confidential: false,
                    rows: Vec::new(),
                });
                let idx = self.groups.len() - 1;
                self.index.insert(key, idx);
                idx
            }
        };
        let group = &mut self.groups[idx];
        group.confidential |=
            fragment.is_confidential() || fragment.contains_non_thread_safe_value();
        group.rows.push(fragment.params());
    }
}

/// Whether the current task is inside [`run_batch`].
pub fn in_batch() -> bool {
    BATCH.try_with(|_| ()).is_ok()
}

/// Queue a statement in the current batch.
pub(crate) fn register(endpoint: &Endpoint, sql: String, fragment: &SqlFragment) -> FragResult<()> {
    BATCH
        .try_with(|registry| registry.borrow_mut().push(endpoint, sql, fragment))
        .map_err(|_| FragError::Other("no batch scope is open".to_string()))
}

/// Run `unit` with update statements deferred, then flush them as grouped batches.
///
/// The flush runs whether `unit` succeeded or not, and stops at the first failing group.
/// If `unit` failed, its error is returned and a flush failure is only logged; otherwise
/// a flush failure is returned. Opening a batch inside another fails with
/// [`FragError::NestedBatch`] without running `unit`.
pub async fn run_batch<F, R, E>(unit: F) -> Result<R, E>
where
    F: Future<Output = Result<R, E>>,
    E: From<FragError>,
{
    if in_batch() {
        return Err(FragError::NestedBatch.into());
    }

    let (result, registry) = BATCH
        .scope(RefCell::new(BatchRegistry::default()), async {
            let result = unit.await;
            (result, BATCH.with(RefCell::take))
        })
        .await;

    let flushed = flush(registry).await;
    match (result, flushed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(flush_error)) => Err(flush_error.into()),
        (Err(unit_error), Ok(())) => Err(unit_error),
        (Err(unit_error), Err(flush_error)) => {
            tracing::warn!(
                target: "pgfrag.sql",
                error = %flush_error,
                "batch flush failed after the unit of work failed"
            );
            Err(unit_error)
        }
    }
}

async fn flush(registry: BatchRegistry) -> FragResult<()> {
    for group in registry.groups {
        let endpoint = &group.endpoint;
        let probe = Probe::start(endpoint.diagnostics());
        let result = endpoint
            .executor()
            .batch_update(&group.sql, &group.rows)
            .await;
        if let Some(probe) = probe {
            let preview = if group.confidential {
                diagnostics::REDACTED.to_string()
            } else {
                format!("<{} rows>", group.rows.len())
            };
            probe.finish(
                endpoint.diagnostics(),
                endpoint.executor(),
                endpoint.name(),
                StatementKind::Batch,
                &group.original,
                &group.sql,
                group.confidential,
                &preview,
                result.as_ref().ok().map(|counts| counts.iter().sum()),
                result.as_ref().err(),
            );
        }
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_is_visible_inside_only() {
        assert!(!in_batch());
        let inside = run_batch(async { Ok::<_, FragError>(in_batch()) })
            .await
            .unwrap();
        assert!(inside);
        assert!(!in_batch());
    }

    #[tokio::test]
    async fn nested_scope_fails_before_running() {
        let result = run_batch(async {
            let mut ran = false;
            let nested = run_batch(async {
                ran = true;
                Ok::<_, FragError>(())
            })
            .await;
            assert!(!ran);
            nested
        })
        .await;
        assert!(matches!(result, Err(FragError::NestedBatch)));
    }

    #[tokio::test]
    async fn unit_error_is_returned() {
        let result: FragResult<()> =
            run_batch(async { Err(FragError::Other("boom".to_string())) }).await;
        assert!(matches!(result, Err(FragError::Other(msg)) if msg == "boom"));
    }
}
