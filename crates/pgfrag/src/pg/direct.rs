use super::RecordRows;
use crate::error::FragResult;
use crate::executor::{Executor, RecordStream, with_leading_newline};
use crate::types::TypeRegistry;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};

/// Executor over one `tokio_postgres::Client`.
///
/// # Example
///
/// ```ignore
/// let executor = DirectExecutor::connect("postgres://postgres@localhost/app").await?;
/// let endpoint = Endpoint::new("main", executor);
/// ```
#[derive(Clone)]
pub struct DirectExecutor {
    client: Arc<Client>,
    registry: Arc<TypeRegistry>,
}

impl DirectExecutor {
    pub fn new(client: Client) -> Self {
        Self::from_arc(Arc::new(client))
    }

    pub fn from_arc(client: Arc<Client>) -> Self {
        Self {
            client,
            registry: TypeRegistry::standard_shared(),
        }
    }

    /// Connect without TLS and drive the connection on a spawned task.
    pub async fn connect(database_url: &str) -> FragResult<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "pgfrag.sql", error = %e, "connection closed with error");
            }
        });
        Ok(Self::new(client))
    }

    /// Read rows with `registry` instead of the standard one.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Executor for DirectExecutor {
    async fn batch_update(&self, sql: &str, rows: &[Vec<Value>]) -> FragResult<Vec<u64>> {
        let sql = with_leading_newline(sql);
        let statement = self.client.prepare(&sql).await?;
        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            counts.push(self.client.execute_raw(&statement, row.iter()).await?);
        }
        Ok(counts)
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> FragResult<RecordStream> {
        let sql = with_leading_newline(sql);
        let rows = self.client.query_raw(sql.as_str(), params.iter()).await?;
        Ok(Box::pin(RecordRows::new(rows, self.registry.clone(), ())))
    }

    async fn update(&self, sql: &str, params: &[Value]) -> FragResult<u64> {
        let sql = with_leading_newline(sql);
        Ok(self.client.execute_raw(sql.as_str(), params.iter()).await?)
    }
}
