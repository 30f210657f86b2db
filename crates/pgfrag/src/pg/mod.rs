//! Executors backed by tokio-postgres.
//!
//! - [`DirectExecutor`] drives a single `tokio_postgres::Client`.
//! - [`PoolExecutor`] (feature `pool`) checks a connection out of a deadpool pool per
//!   call and uses its prepared-statement cache. A streamed query keeps its
//!   connection until the stream is dropped.
//!
//! Driver rows are converted to [`Record`]s with the read strategy the type registry
//! selects for each column's Postgres type.

mod direct;
#[cfg(feature = "pool")]
mod pool;

pub use direct::DirectExecutor;
#[cfg(feature = "pool")]
pub use pool::{
    DEFAULT_POOL_SIZE, PoolExecutor, create_pool, create_pool_with_config,
    create_pool_with_manager_config, create_pool_with_tls,
};

use crate::error::FragResult;
use crate::record::{Column, Record};
use crate::types::TypeRegistry;
use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio_postgres::{Row, RowStream};

/// Column metadata of a driver row.
pub fn columns_of(row: &Row) -> Arc<[Column]> {
    row.columns()
        .iter()
        .map(|c| Column::new(c.name(), c.type_().name()))
        .collect()
}

/// Convert a driver row using `registry`'s read strategies.
pub fn record_from_row(
    registry: &TypeRegistry,
    columns: &Arc<[Column]>,
    row: &Row,
) -> FragResult<Record> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, c)| registry.select_for_pg_type(c.type_()).read(row, idx))
        .collect::<FragResult<Vec<_>>>()?;
    Ok(Record::new(columns.clone(), values))
}

/// Driver row stream mapped to records.
///
/// `holder` is kept alive for as long as the stream (e.g. a pooled connection).
pub(crate) struct RecordRows<H> {
    rows: Pin<Box<RowStream>>,
    registry: Arc<TypeRegistry>,
    columns: Option<Arc<[Column]>>,
    _holder: H,
}

impl<H> RecordRows<H> {
    pub(crate) fn new(rows: RowStream, registry: Arc<TypeRegistry>, holder: H) -> Self {
        Self {
            rows: Box::pin(rows),
            registry,
            columns: None,
            _holder: holder,
        }
    }
}

impl<H: Unpin> Stream for RecordRows<H> {
    type Item = FragResult<Record>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.rows.as_mut().poll_next(cx)) {
            Some(Ok(row)) => {
                let columns = this.columns.get_or_insert_with(|| columns_of(&row));
                Poll::Ready(Some(record_from_row(&this.registry, columns, &row)))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
            None => Poll::Ready(None),
        }
    }
}
