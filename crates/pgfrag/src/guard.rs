//! Single-threaded scope for values whose binding is not thread-safe.
//!
//! Stream values wrap a reader that is drained when the statement executes, so a
//! fragment carrying one must be built and executed by the same task. Building such a
//! fragment outside [`single_threaded`] / [`single_threaded_sync`] fails with
//! [`FragError::NonThreadSafeViolation`](crate::FragError::NonThreadSafeViolation).
//!
//! # Example
//!
//! ```ignore
//! use pgfrag::{single_threaded, bindings, SqlFragment, Value};
//!
//! single_threaded(async {
//!     let upload = SqlFragment::new(
//!         "INSERT INTO files (body) VALUES (:body)",
//!         &bindings! { "body" => Value::binary_stream(file) },
//!     )?;
//!     endpoint.query::<()>(upload).execute().await
//! })
//! .await?;
//! ```

use std::future::Future;

tokio::task_local! {
    static SINGLE_THREADED: ();
}

/// Run `fut` as a guarded single-threaded path.
///
/// `fut` need not be `Send`; it is polled only by the task awaiting this call.
pub async fn single_threaded<F: Future>(fut: F) -> F::Output {
    SINGLE_THREADED.scope((), fut).await
}

/// Run `f` as a guarded single-threaded path.
pub fn single_threaded_sync<R>(f: impl FnOnce() -> R) -> R {
    SINGLE_THREADED.sync_scope((), f)
}

/// Whether the caller runs inside [`single_threaded`] or [`single_threaded_sync`].
pub fn in_single_threaded_scope() -> bool {
    SINGLE_THREADED.try_with(|_| ()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_scope_is_visible_inside_only() {
        assert!(!in_single_threaded_scope());
        assert!(single_threaded_sync(in_single_threaded_scope));
        assert!(!in_single_threaded_scope());
    }

    #[tokio::test]
    async fn async_scope_is_visible_across_awaits() {
        let seen = single_threaded(async {
            tokio::task::yield_now().await;
            in_single_threaded_scope()
        })
        .await;
        assert!(seen);
        assert!(!in_single_threaded_scope());
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit_the_scope() {
        let inner = single_threaded(async { tokio::spawn(async { in_single_threaded_scope() }).await })
            .await
            .unwrap();
        assert!(!inner);
    }
}
