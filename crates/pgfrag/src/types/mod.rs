//! Type registry: how values are written to statements and read from rows.
//!
//! Each [`TypeBinding`] is a strategy for one semantic type. The [`TypeRegistry`] holds a
//! catalog of bindings and selects one:
//! - for a runtime value ([`TypeRegistry::select_for_value`], never fails),
//! - for a declared Rust type ([`TypeRegistry::select_for_declared`], fails on unknown types),
//! - by catalog name ([`TypeRegistry::by_name`]), as used by placeholder type hints,
//! - for a Postgres column type ([`TypeRegistry::select_for_pg_type`]), when reading rows.
//!
//! # Example
//!
//! ```ignore
//! use pgfrag::{TypeRegistry, Value};
//!
//! let registry = TypeRegistry::standard();
//! assert_eq!(registry.select_for_value(&Value::Int(5)).name(), "INTEGER");
//! assert_eq!(registry.select_for_declared::<Option<i64>>()?.name(), "BIGINT");
//! ```

mod builtin;


pub use builtin::{CustomBinding, RawValue};

use crate::error::{FragError, FragResult};
use crate::record::Record;
use crate::value::{Value, ValueKind};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, LazyLock};
use tokio_postgres::Row;
use tokio_postgres::types::Type;

/// A binding strategy for one semantic type.
pub trait TypeBinding: Send + Sync {
    /// Catalog name, as used in `/*NAME*/` type hints.
    fn name(&self) -> &str;

    /// The value variant this binding handles.
    fn value_kind(&self) -> ValueKind;

    /// For [`ValueKind::Custom`] bindings: the Rust type of the wrapped value.
    fn custom_type(&self) -> Option<TypeId> {
        None
    }

    /// Rust types that declare this binding (e.g. `i32` and `Option<i32>` for `INTEGER`).
    fn declared_types(&self) -> Vec<TypeId> {
        Vec::new()
    }

    /// Postgres column types read with this binding.
    fn pg_types(&self) -> Vec<Type> {
        Vec::new()
    }

    /// Whether a bound value of this type may be shared across threads.
    fn is_thread_safe(&self) -> bool {
        true
    }

    /// Whether one value expands to several positional parameters.
    fn is_expansion(&self) -> bool {
        false
    }

    /// Runtime type check.
    fn accepts(&self, value: &Value) -> bool {
        if value.kind() != self.value_kind() {
            return false;
        }
        match (self.custom_type(), value) {
            (Some(expected), Value::Custom(c)) => c.type_id() == expected,
            _ => true,
        }
    }

    /// Number of positional parameters `value` occupies.
    fn positions(&self, value: &Value) -> usize {
        let _ = value;
        1
    }

    /// Append the positional parameters for `value` to `out`; returns how many were written.
    fn write(
        &self,
        registry: &TypeRegistry,
        out: &mut Vec<Value>,
        value: &Value,
    ) -> FragResult<usize> {
        let _ = registry;
        out.push(value.clone());
        Ok(1)
    }

    /// Read column `idx` of a driver row.
    fn read(&self, row: &Row, idx: usize) -> FragResult<Value>;

    /// Convert an already-read value into this type, widening where lossless.
    fn coerce(&self, value: Value) -> FragResult<Value> {
        if value.is_null() || self.accepts(&value) {
            Ok(value)
        } else {
            Err(FragError::decode(
                "<value>",
                format!("expected {}, found {}", self.name(), value.type_label()),
            ))
        }
    }

    /// Read a named field from a record, coerced into this type.
    fn read_record(&self, record: &Record, column: &str) -> FragResult<Value> {
        let value = record
            .value(column)
            .ok_or_else(|| FragError::decode(column, "no such column"))?;
        self.coerce(value.clone()).map_err(|e| match e {
            FragError::Decode { message, .. } => FragError::decode(column, message),
            other => other,
        })
    }
}

/// Shared handle to a registered [`TypeBinding`].
#[derive(Clone)]
pub struct BoundType(Arc<dyn TypeBinding>);

impl BoundType {
    pub fn new(binding: impl TypeBinding + 'static) -> Self {
        Self(Arc::new(binding))
    }

    /// Whether both handles refer to the same registered binding.
    pub fn same(&self, other: &BoundType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for BoundType {
    type Target = dyn TypeBinding;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for BoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundType").field(&self.0.name()).finish()
    }
}

impl PartialEq for BoundType {
    fn eq(&self, other: &Self) -> bool {
        self.same(other) || self.name() == other.name()
    }
}

static STANDARD: LazyLock<Arc<TypeRegistry>> =
    LazyLock::new(|| Arc::new(TypeRegistry::builder().build()));

/// Immutable catalog of type bindings.
///
/// Lookups take `&self` only, so a registry can be shared freely across threads.
pub struct TypeRegistry {
    bindings: Vec<BoundType>,
    by_name: HashMap<String, usize>,
    by_kind: HashMap<ValueKind, usize>,
    by_custom: HashMap<TypeId, usize>,
    by_declared: HashMap<TypeId, usize>,
    by_pg: HashMap<Type, usize>,
    null: usize,
    fallback: usize,
}

impl TypeRegistry {
    /// The process-wide registry with the built-in catalog.
    pub fn standard() -> &'static TypeRegistry {
        &STANDARD
    }

    /// Shared handle to [`TypeRegistry::standard`], for executors that own their registry.
    pub fn standard_shared() -> Arc<TypeRegistry> {
        Arc::clone(&STANDARD)
    }

    /// Start from the built-in catalog and add bindings.
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            bindings: builtin::standard_bindings(),
        }
    }

    /// All registered bindings, in registration order.
    pub fn bindings(&self) -> &[BoundType] {
        &self.bindings
    }

    /// The binding for `NULL`.
    pub fn null_type(&self) -> &BoundType {
        &self.bindings[self.null]
    }

    /// The generic binding used for values without a dedicated binding.
    pub fn fallback_type(&self) -> &BoundType {
        &self.bindings[self.fallback]
    }

    /// Select the binding for a runtime value. Never fails.
    pub fn select_for_value(&self, value: &Value) -> &BoundType {
        let idx = match value {
            Value::Null => Some(self.null),
            Value::Custom(c) => self.by_custom.get(&c.type_id()).copied(),
            other => self.by_kind.get(&other.kind()).copied(),
        };
        &self.bindings[idx.unwrap_or(self.fallback)]
    }

    /// Select the binding for a declared Rust type.
    pub fn select_for_declared<T: 'static>(&self) -> FragResult<&BoundType> {
        self.select_for_declared_type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Select the binding for a declared type id. Fails with [`FragError::UnknownType`].
    pub fn select_for_declared_type(
        &self,
        type_id: TypeId,
        type_name: &str,
    ) -> FragResult<&BoundType> {
        self.by_declared
            .get(&type_id)
            .map(|&i| &self.bindings[i])
            .ok_or_else(|| FragError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Resolve a catalog name (case-insensitive).
    pub fn by_name(&self, name: &str) -> FragResult<&BoundType> {
        self.by_name
            .get(&name.to_ascii_uppercase())
            .map(|&i| &self.bindings[i])
            .ok_or_else(|| FragError::unknown_type_name(name))
    }

    /// Resolve the element type of an expansion type hint (`LIST<NAME>`).
    ///
    /// Expansion types are rejected: lists of lists are not expandable.
    pub fn argument_type_by_name(&self, name: &str) -> FragResult<&BoundType> {
        let ty = self.by_name(name)?;
        if ty.is_expansion() {
            return Err(FragError::unknown_type_name(format!(
                "{name} (expansion types cannot be list elements)"
            )));
        }
        Ok(ty)
    }

    /// Select the binding that reads a Postgres column type.
    pub fn select_for_pg_type(&self, ty: &Type) -> &BoundType {
        let idx = self.by_pg.get(ty).copied().unwrap_or(self.fallback);
        &self.bindings[idx]
    }

    /// Whether a value (and every element of a list) may be shared across threads.
    pub fn is_thread_safe(&self, value: &Value) -> bool {
        match value {
            Value::List(items) => items.iter().all(|v| self.is_thread_safe(v)),
            other => self.select_for_value(other).is_thread_safe(),
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| b.name()))
            .finish()
    }
}

/// Builder for a [`TypeRegistry`].
///
/// Later registrations take precedence over earlier ones for every lookup key they share.
pub struct TypeRegistryBuilder {
    bindings: Vec<BoundType>,
}

impl TypeRegistryBuilder {
    /// Add a binding.
    pub fn register(mut self, binding: impl TypeBinding + 'static) -> Self {
        self.bindings.push(BoundType::new(binding));
        self
    }

    /// Add a binding for an application type with its own `ToSql`/`FromSql`.
    ///
    /// The registered Postgres types are read with this binding as well.
    pub fn register_custom<T>(self, name: &'static str, pg_types: Vec<Type>) -> Self
    where
        T: tokio_postgres::types::ToSql
            + for<'a> tokio_postgres::types::FromSql<'a>
            + Send
            + Sync
            + 'static,
    {
        self.register(CustomBinding::<T>::new(name, pg_types))
    }

    pub fn build(self) -> TypeRegistry {
        let mut by_name = HashMap::new();
        let mut by_kind = HashMap::new();
        let mut by_custom = HashMap::new();
        let mut by_declared = HashMap::new();
        let mut by_pg = HashMap::new();
        let mut null = None;
        let mut fallback = None;

        for (i, b) in self.bindings.iter().enumerate() {
            by_name.insert(b.name().to_ascii_uppercase(), i);
            match (b.value_kind(), b.custom_type()) {
                (ValueKind::Null, _) => null = Some(i),
                (ValueKind::Custom, Some(id)) => {
                    by_custom.insert(id, i);
                }
                (ValueKind::Custom, None) => fallback = Some(i),
                (kind, _) => {
                    by_kind.insert(kind, i);
                }
            }
            for id in b.declared_types() {
                by_declared.insert(id, i);
            }
            for ty in b.pg_types() {
                by_pg.insert(ty, i);
            }
        }

        let mut bindings = self.bindings;
        let null = null.unwrap_or_else(|| {
            bindings.push(BoundType::new(builtin::NullBinding));
            bindings.len() - 1
        });
        let fallback = fallback.unwrap_or_else(|| {
            bindings.push(BoundType::new(builtin::ObjectBinding));
            bindings.len() - 1
        });

        TypeRegistry {
            bindings,
            by_name,
            by_kind,
            by_custom,
            by_declared,
            by_pg,
            null,
            fallback,
        }
    }
}
