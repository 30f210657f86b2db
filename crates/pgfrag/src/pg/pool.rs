use super::RecordRows;
use crate::error::{FragError, FragResult};
use crate::executor::{Executor, RecordStream, with_leading_newline};
use crate::types::TypeRegistry;
use crate::value::Value;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, PoolBuilder, RecyclingMethod};
use std::sync::Arc;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{NoTls, Socket};

/// Executor over a deadpool connection pool.
///
/// Statements are prepared through each connection's statement cache.
#[derive(Clone)]
pub struct PoolExecutor {
    pool: Pool,
    registry: Arc<TypeRegistry>,
}

impl PoolExecutor {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            registry: TypeRegistry::standard_shared(),
        }
    }

    /// Pool executor for `database_url` without TLS, at most [`DEFAULT_POOL_SIZE`]
    /// connections. Connections are opened on first use.
    pub fn connect(database_url: &str) -> FragResult<Self> {
        Ok(Self::new(create_pool(database_url)?))
    }

    /// Like [`connect`](Self::connect) with at most `max_size` connections.
    pub fn connect_with_size(database_url: &str, max_size: usize) -> FragResult<Self> {
        Ok(Self::new(create_pool_with_config(database_url, max_size)?))
    }

    /// Read rows with `registry` instead of the standard one.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Executor for PoolExecutor {
    async fn batch_update(&self, sql: &str, rows: &[Vec<Value>]) -> FragResult<Vec<u64>> {
        let sql = with_leading_newline(sql);
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(&sql).await?;
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push(client.execute_raw(&statement, row.iter()).await?);
        }
        Ok(counts)
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> FragResult<RecordStream> {
        let sql = with_leading_newline(sql);
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(&sql).await?;
        let rows = client.query_raw(&statement, params.iter()).await?;
        Ok(Box::pin(RecordRows::new(rows, self.registry.clone(), client)))
    }

    async fn update(&self, sql: &str, params: &[Value]) -> FragResult<u64> {
        let sql = with_leading_newline(sql);
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(&sql).await?;
        Ok(client.execute_raw(&statement, params.iter()).await?)
    }
}

/// Connections per pool when no size is given.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Pool for [`PoolExecutor`]: no TLS, [`DEFAULT_POOL_SIZE`] connections.
///
/// ```ignore
/// let endpoint = Endpoint::new("main", PoolExecutor::new(pgfrag::create_pool(&url)?));
/// ```
pub fn create_pool(database_url: &str) -> FragResult<Pool> {
    create_pool_with_config(database_url, DEFAULT_POOL_SIZE)
}

/// Pool for [`PoolExecutor`] holding at most `max_size` connections, no TLS.
pub fn create_pool_with_config(database_url: &str, max_size: usize) -> FragResult<Pool> {
    create_pool_with_manager_config(database_url, NoTls, fast_recycling(), |pool| {
        pool.max_size(max_size)
    })
}

/// Pool for [`PoolExecutor`] whose connections go through `tls`.
pub fn create_pool_with_tls<T>(database_url: &str, tls: T) -> FragResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    create_pool_with_manager_config(database_url, tls, fast_recycling(), |pool| {
        pool.max_size(DEFAULT_POOL_SIZE)
    })
}

/// Pool for [`PoolExecutor`] with full control over recycling and pool tuning.
///
/// An unparsable URL is a [`FragError::Connection`]; a pool that cannot be built is a
/// [`FragError::Pool`]. No connection is opened here.
pub fn create_pool_with_manager_config<T>(
    database_url: &str,
    tls: T,
    manager_config: ManagerConfig,
    tune: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> FragResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let config = database_url
        .parse::<tokio_postgres::Config>()
        .map_err(|e| FragError::Connection(format!("invalid database url: {e}")))?;
    let builder = Pool::builder(Manager::from_config(config, tls, manager_config));
    tune(builder)
        .build()
        .map_err(|e| FragError::Pool(e.to_string()))
}

/// Recycled connections are reused without a round trip; the statement cache survives.
fn fast_recycling() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}
