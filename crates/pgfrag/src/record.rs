//! Row representation handed to result mappers.
//!
//! Executors convert driver rows into [`Record`]s using the type registry's read
//! strategies, so mapping code never depends on a particular driver.

use crate::error::{FragError, FragResult};
use crate::value::{FromValue, Value};
use std::sync::Arc;

/// Column metadata shared by every record of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Database type name as reported by the backend.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// One result row: ordered columns and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record. `values` must be as long as `columns`; missing values read as NULL.
    pub fn new(columns: Arc<[Column]>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    /// Build a record from `(column, value)` pairs. Column types are left blank.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<Column>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (Column::new(k, ""), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|i| &self.values[i])
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed access by column name.
    pub fn try_get<T: FromValue>(&self, column: &str) -> FragResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| FragError::decode(column, "no such column"))?;
        T::from_value(value.clone()).map_err(|e| relabel(e, column))
    }

    /// Typed access by column position.
    pub fn try_get_at<T: FromValue>(&self, index: usize) -> FragResult<T> {
        let value = self
            .value_at(index)
            .ok_or_else(|| FragError::decode(index.to_string(), "column index out of range"))?;
        T::from_value(value.clone()).map_err(|e| relabel(e, &index.to_string()))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn relabel(err: FragError, column: &str) -> FragError {
    match err {
        FragError::Decode { message, .. } => FragError::decode(column, message),
        other => other,
    }
}

/// Trait for converting a [`Record`] into a Rust value.
///
/// This is the row-accepting constructor of a generated result type.
///
/// # Example
///
/// ```ignore
/// struct User {
///     id: i64,
///     username: String,
/// }
///
/// impl FromRecord for User {
///     fn from_record(record: &Record) -> FragResult<Self> {
///         Ok(Self {
///             id: record.try_get("id")?,
///             username: record.try_get("username")?,
///         })
///     }
/// }
/// ```
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> FragResult<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> FragResult<Self> {
        Ok(record.clone())
    }
}
