//! Convenient imports for typical `pgfrag` usage.
//!
//! ```ignore
//! use pgfrag::prelude::*;
//! ```

pub use crate::bindings;
pub use crate::{
    Bindings, DiagnosticsConfig, DirectExecutor, Endpoint, Executor, FragError, FragResult,
    FromRecord, FromValue, QueryHandle, Record, ResultShape, SqlFragment, Substitutions, Value,
    run_batch, single_threaded,
};

#[cfg(feature = "pool")]
pub use crate::{PoolExecutor, create_pool, create_pool_with_config};
