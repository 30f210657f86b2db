//! # pgfrag
//!
//! Named-placeholder SQL fragments for PostgreSQL: typed binding, algebraic composition,
//! streaming results and batched execution.
//!
//! ## Features
//!
//! - **Templates with named placeholders**: `:name`, optionally typed as `:name/*BIGINT*/`
//!   or `:ids/*LIST<BIGINT>*/`; lists expand to one marker per element
//! - **Resolved at construction**: a [`SqlFragment`] either binds every placeholder or
//!   is not built at all
//! - **Composition**: `concat`, `and`/`or` with minimal parentheses, `${keyword}`
//!   substitution
//! - **Pluggable types**: a [`TypeRegistry`] of write/read strategies, extensible with
//!   application types
//! - **Pluggable executors**: anything implementing [`Executor`]; tokio-postgres client
//!   and deadpool pool executors included
//! - **Batches**: [`run_batch`] groups deferred updates per endpoint and statement
//! - **Diagnostics**: per-execution `tracing` events with value previews and redaction
//!
//! ## Example
//!
//! ```ignore
//! use pgfrag::prelude::*;
//!
//! let endpoint = Endpoint::new("main", DirectExecutor::connect(&url).await?);
//!
//! let by_status = SqlFragment::new("status = :status", &bindings! { "status" => "active" })?;
//! let by_org = SqlFragment::new("org_id IN (:orgs)", &bindings! { "orgs" => vec![1_i64, 2] })?;
//!
//! let users = endpoint
//!     .records(SqlFragment::text("SELECT id, username FROM users WHERE "))
//!     .concat(by_status.and(by_org))
//!     .list_map(|r| r.try_get::<String>("username"))
//!     .await?;
//! ```

pub mod batch;
pub mod catalog;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod finder;
pub mod fragment;
pub mod guard;
pub mod handle;
pub mod materialize;
pub mod pg;
pub mod prelude;
pub mod record;
pub mod types;
pub mod value;

pub use batch::{in_batch, run_batch};
pub use catalog::{ParamDescriptor, QueryCatalog, QueryDescriptor, StaticParam, StaticQuery};
pub use diagnostics::DiagnosticsConfig;
pub use endpoint::Endpoint;
pub use error::{FragError, FragResult};
pub use executor::{Executor, RecordStream, StatementKind, StatementLog};
pub use finder::{PlaceholderFinder, PlaceholderMatch, Token};
pub use fragment::{
    Binding, Bindings, CompositionKind, Element, ParamStyle, Placeholder, SqlFragment,
    Substitutions,
};
pub use guard::{in_single_threaded_scope, single_threaded, single_threaded_sync};
pub use handle::{MappedStream, QueryHandle};
pub use materialize::{FieldDescriptor, GeneratedShape, ResultShape};
pub use pg::DirectExecutor;
#[cfg(feature = "pool")]
pub use pg::{
    DEFAULT_POOL_SIZE, PoolExecutor, create_pool, create_pool_with_config,
    create_pool_with_manager_config, create_pool_with_tls,
};
pub use record::{Column, FromRecord, Record};
pub use types::{BoundType, CustomBinding, RawValue, TypeBinding, TypeRegistry, TypeRegistryBuilder};
pub use value::{CustomValue, FromValue, StreamValue, Value, ValueKind};

// Re-export for `inventory::submit!` in downstream crates.
pub use inventory;
