//! Error types for pgfrag

use thiserror::Error;

/// Result type alias for pgfrag operations
pub type FragResult<T> = Result<T, FragError>;

/// Error types for fragment construction and execution
#[derive(Debug, Error)]
pub enum FragError {
    /// A template references a name absent from the supplied bindings
    #[error("Placeholder ':{name}' has no bound value")]
    PlaceholderNotFound { name: String },

    /// A declared Rust type has no registered binding
    #[error("No binding registered for declared type '{type_name}'")]
    UnknownType { type_name: String },

    /// A type hint or descriptor names a type missing from the catalog
    #[error("Unknown type name '{name}'")]
    UnknownTypeName { name: String },

    /// A non-thread-safe value was bound outside a single-threaded scope
    #[error(
        "Placeholder ':{placeholder}' binds a {type_name} value, which is not thread-safe; \
         build the fragment inside `single_threaded`"
    )]
    NonThreadSafeViolation {
        placeholder: String,
        type_name: String,
    },

    /// A list value contains another list
    #[error("Placeholder ':{placeholder}' binds a nested list, which cannot be expanded")]
    NestedExpansion { placeholder: String },

    /// `optional()` found more than one row
    #[error("Expected at most one row, got {count}")]
    TooManyResults { count: usize },

    /// A `${keyword}` marker has no mapped fragment
    #[error("Unresolved keyword '${{{keyword}}}'")]
    UnresolvedKeyword { keyword: String },

    /// `run_batch` was called while a batch scope is already open on this task
    #[error("A batch scope is already open on this task")]
    NestedBatch,

    /// A bound value does not match the declared parameter type
    #[error("Placeholder ':{placeholder}' expects {expected}, got {found}")]
    TypeMismatch {
        placeholder: String,
        expected: String,
        found: String,
    },

    /// A query name was registered twice in a catalog
    #[error("Query '{0}' is already registered")]
    DuplicateQuery(String),

    /// A query name is missing from a catalog
    #[error("Unknown query '{0}'")]
    UnknownQuery(String),

    /// Database driver failure
    #[error("Backend error: {0}")]
    Backend(#[from] tokio_postgres::Error),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A stream value was read a second time
    #[error("Stream value has already been consumed")]
    StreamConsumed,

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl FragError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub(crate) fn placeholder_not_found(name: impl Into<String>) -> Self {
        Self::PlaceholderNotFound { name: name.into() }
    }

    pub(crate) fn unknown_type_name(name: impl Into<String>) -> Self {
        Self::UnknownTypeName { name: name.into() }
    }

    /// Check if this is a too-many-results error
    pub fn is_too_many_results(&self) -> bool {
        matches!(self, Self::TooManyResults { .. })
    }

    /// Check if this error came from the database driver
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// SQLSTATE code of the underlying database error, if any.
    pub fn db_code(&self) -> Option<&str> {
        match self {
            Self::Backend(err) => err.as_db_error().map(|db| db.code().code()),
            _ => None,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for FragError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
