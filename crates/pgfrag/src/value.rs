//! Dynamically typed bind values.
//!
//! Every value bound to a placeholder is converted into a [`Value`]. The variant is the
//! runtime type the [`TypeRegistry`](crate::types::TypeRegistry) dispatches on; values of
//! application types without a dedicated variant travel as [`CustomValue`].

use crate::error::{FragError, FragResult};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::any::{Any, TypeId};
use std::error::Error;
use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A bind value or a value read from a row.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    /// Large binary object.
    Blob(Bytes),
    /// Large character object.
    Clob(Arc<str>),
    /// Single-use binary reader, drained when bound.
    BinaryStream(StreamValue),
    /// Single-use UTF-8 reader, drained when bound.
    CharacterStream(StreamValue),
    /// Comma-list expansion: one positional parameter per element.
    List(Vec<Value>),
    Custom(CustomValue),
}

/// Discriminant of a [`Value`], used for type dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Bytes,
    Uuid,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Blob,
    Clob,
    BinaryStream,
    CharacterStream,
    List,
    Custom,
}

impl Value {
    /// Wrap an application type that implements `ToSql`.
    pub fn custom<T>(value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        Value::Custom(CustomValue::new(value))
    }

    /// Build a list value from any iterator of convertible items.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Wrap a reader whose bytes are sent when the statement is executed.
    pub fn binary_stream(reader: impl Read + Send + 'static) -> Self {
        Value::BinaryStream(StreamValue::new(reader))
    }

    /// Wrap a reader whose UTF-8 text is sent when the statement is executed.
    pub fn character_stream(reader: impl Read + Send + 'static) -> Self {
        Value::CharacterStream(StreamValue::new(reader))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::SmallInt(_) => ValueKind::SmallInt,
            Value::Int(_) => ValueKind::Int,
            Value::BigInt(_) => ValueKind::BigInt,
            Value::Real(_) => ValueKind::Real,
            Value::Double(_) => ValueKind::Double,
            Value::Numeric(_) => ValueKind::Numeric,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Json(_) => ValueKind::Json,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::TimestampTz(_) => ValueKind::TimestampTz,
            Value::Blob(_) => ValueKind::Blob,
            Value::Clob(_) => ValueKind::Clob,
            Value::BinaryStream(_) => ValueKind::BinaryStream,
            Value::CharacterStream(_) => ValueKind::CharacterStream,
            Value::List(_) => ValueKind::List,
            Value::Custom(_) => ValueKind::Custom,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short human-readable name of the runtime type, for error messages.
    pub fn type_label(&self) -> &str {
        match self {
            Value::Custom(c) => c.type_name(),
            other => match other.kind() {
                ValueKind::Null => "null",
                ValueKind::Bool => "bool",
                ValueKind::SmallInt => "i16",
                ValueKind::Int => "i32",
                ValueKind::BigInt => "i64",
                ValueKind::Real => "f32",
                ValueKind::Double => "f64",
                ValueKind::Numeric => "Decimal",
                ValueKind::Text => "String",
                ValueKind::Bytes => "Vec<u8>",
                ValueKind::Uuid => "Uuid",
                ValueKind::Json => "JSON",
                ValueKind::Date => "NaiveDate",
                ValueKind::Time => "NaiveTime",
                ValueKind::Timestamp => "NaiveDateTime",
                ValueKind::TimestampTz => "DateTime<Utc>",
                ValueKind::Blob => "blob",
                ValueKind::Clob => "clob",
                ValueKind::BinaryStream => "binary stream",
                ValueKind::CharacterStream => "character stream",
                ValueKind::List => "list",
                ValueKind::Custom => "custom",
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::SmallInt(l), Value::SmallInt(r)) => l == r,
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::BigInt(l), Value::BigInt(r)) => l == r,
            (Value::Real(l), Value::Real(r)) => l == r,
            (Value::Double(l), Value::Double(r)) => l == r,
            (Value::Numeric(l), Value::Numeric(r)) => l == r,
            (Value::Text(l), Value::Text(r)) => l == r,
            (Value::Bytes(l), Value::Bytes(r)) => l == r,
            (Value::Uuid(l), Value::Uuid(r)) => l == r,
            (Value::Json(l), Value::Json(r)) => l == r,
            (Value::Date(l), Value::Date(r)) => l == r,
            (Value::Time(l), Value::Time(r)) => l == r,
            (Value::Timestamp(l), Value::Timestamp(r)) => l == r,
            (Value::TimestampTz(l), Value::TimestampTz(r)) => l == r,
            (Value::Blob(l), Value::Blob(r)) => l == r,
            (Value::Clob(l), Value::Clob(r)) => l == r,
            (Value::BinaryStream(l), Value::BinaryStream(r))
            | (Value::CharacterStream(l), Value::CharacterStream(r)) => l.same_stream(r),
            (Value::List(l), Value::List(r)) => l == r,
            (Value::Custom(l), Value::Custom(r)) => Arc::ptr_eq(&l.inner, &r.inner),
            _ => false,
        }
    }
}

/// Literal-like rendering used by diagnostic previews.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Numeric(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "'{v}'"),
            Value::Json(v) => write!(f, "'{v}'"),
            Value::Date(v) => write!(f, "'{v}'"),
            Value::Time(v) => write!(f, "'{v}'"),
            Value::Timestamp(v) => write!(f, "'{v}'"),
            Value::TimestampTz(v) => write!(f, "'{}'", v.to_rfc3339()),
            Value::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            Value::Clob(v) => write!(f, "<clob {} chars>", v.chars().count()),
            Value::BinaryStream(_) => f.write_str("<binary stream>"),
            Value::CharacterStream(_) => f.write_str("<character stream>"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Custom(c) => write!(f, "{:?}", c.as_sql()),
        }
    }
}

// ===== Custom values =====

trait CustomSql: ToSql + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_sql(&self) -> &(dyn ToSql + Sync);
}

impl<T: ToSql + Send + Sync + 'static> CustomSql for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        self
    }
}

/// An application value with its own `ToSql` implementation.
#[derive(Clone)]
pub struct CustomValue {
    inner: Arc<dyn CustomSql>,
    type_id: TypeId,
    type_name: &'static str,
}

impl CustomValue {
    pub fn new<T>(value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Runtime type of the wrapped value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        (*self.inner).as_any().downcast_ref::<T>()
    }

    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        (*self.inner).as_sql()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type", &self.type_name)
            .field("value", &self.as_sql())
            .finish()
    }
}

// ===== Stream values =====

/// A reader that can be drained exactly once.
///
/// Clones share the same reader, so draining through one clone consumes it for all.
#[derive(Clone)]
pub struct StreamValue {
    reader: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
}

impl StreamValue {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Drain the reader. Fails with [`FragError::StreamConsumed`] on the second call.
    pub fn take_bytes(&self) -> FragResult<Vec<u8>> {
        let mut guard = self
            .reader
            .lock()
            .map_err(|_| FragError::Other("stream value lock poisoned".to_string()))?;
        let mut reader = guard.take().ok_or(FragError::StreamConsumed)?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| FragError::Other(format!("failed to read stream value: {e}")))?;
        Ok(buf)
    }

    pub fn take_string(&self) -> FragResult<String> {
        let bytes = self.take_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| FragError::Other(format!("character stream is not UTF-8: {e}")))
    }

    pub fn is_consumed(&self) -> bool {
        self.reader.lock().map(|g| g.is_none()).unwrap_or(true)
    }

    fn same_stream(&self, other: &StreamValue) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader)
    }
}

impl fmt::Debug for StreamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamValue")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

// ===== ToSql =====

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::SmallInt(v) => int_to_sql(i64::from(*v), ty, out),
            Value::Int(v) => int_to_sql(i64::from(*v), ty, out),
            Value::BigInt(v) => int_to_sql(*v, ty, out),
            Value::Real(v) if *ty == Type::FLOAT4 => v.to_sql(ty, out),
            Value::Real(v) => float_to_sql(f64::from(*v), ty, out),
            Value::Double(v) => float_to_sql(*v, ty, out),
            Value::Numeric(v) => v.to_sql_checked(ty, out),
            Value::Text(v) => v.to_sql_checked(ty, out),
            Value::Bytes(v) => v.as_slice().to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Json(v) => v.to_sql_checked(ty, out),
            Value::Date(v) => v.to_sql_checked(ty, out),
            Value::Time(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => v.to_sql_checked(ty, out),
            Value::TimestampTz(v) => v.to_sql_checked(ty, out),
            Value::Blob(v) => v.as_ref().to_sql_checked(ty, out),
            Value::Clob(v) => v.as_ref().to_sql_checked(ty, out),
            Value::BinaryStream(s) => s.take_bytes()?.as_slice().to_sql_checked(ty, out),
            Value::CharacterStream(s) => s.take_string()?.to_sql_checked(ty, out),
            Value::List(_) => Err("list values must be expanded before execution".into()),
            Value::Custom(c) => c.as_sql().to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

// ===== Conversions into Value =====

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Double,
    Decimal => Numeric,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    serde_json::Value => Json,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Bytes => Blob,
    Arc<str> => Clob,
    CustomValue => Custom,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

macro_rules! impl_from_vec_for_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Value::list(v)
                }
            }
        )*
    };
}

impl_from_vec_for_value!(
    bool, i16, i32, i64, f32, f64, Decimal, String, &str, Uuid, NaiveDate, Value,
);

// ===== Conversions out of Value =====

/// Types that can be extracted from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> FragResult<Self>;
}

fn mismatch<T>(expected: &str, found: &Value) -> FragResult<T> {
    Err(FragError::decode(
        "<value>",
        format!("expected {expected}, found {}", found.type_label()),
    ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> FragResult<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            other => mismatch("bool", &other),
        }
    }
}

impl FromValue for i16 {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::SmallInt(v) => Ok(v),
            other => mismatch("i16", &other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::SmallInt(v) => Ok(i32::from(v)),
            Value::Int(v) => Ok(v),
            other => mismatch("i32", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::SmallInt(v) => Ok(i64::from(v)),
            Value::Int(v) => Ok(i64::from(v)),
            Value::BigInt(v) => Ok(v),
            other => mismatch("i64", &other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Real(v) => Ok(v),
            other => mismatch("f32", &other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Real(v) => Ok(f64::from(v)),
            Value::Double(v) => Ok(v),
            other => mismatch("f64", &other),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Numeric(v) => Ok(v),
            Value::SmallInt(v) => Ok(Decimal::from(v)),
            Value::Int(v) => Ok(Decimal::from(v)),
            Value::BigInt(v) => Ok(Decimal::from(v)),
            other => mismatch("Decimal", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Text(v) => Ok(v),
            Value::Clob(v) => Ok(v.to_string()),
            Value::CharacterStream(s) => s.take_string(),
            other => mismatch("String", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::Blob(v) => Ok(v.to_vec()),
            Value::BinaryStream(s) => s.take_bytes(),
            other => mismatch("Vec<u8>", &other),
        }
    }
}

impl FromValue for Bytes {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Blob(v) => Ok(v),
            Value::Bytes(v) => Ok(Bytes::from(v)),
            other => mismatch("Bytes", &other),
        }
    }
}

macro_rules! impl_from_value_simple {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> FragResult<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => mismatch(stringify!($ty), &other),
                    }
                }
            }
        )*
    };
}

impl_from_value_simple! {
    Uuid => Uuid,
    serde_json::Value => Json,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> FragResult<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("list", &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_none_becomes_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(3_i64)), Value::BigInt(3));
    }

    #[test]
    fn vec_becomes_list() {
        assert_eq!(
            Value::from(vec![1, 2, 3]),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn integer_extraction_widens() {
        assert_eq!(i64::from_value(Value::Int(7)).unwrap(), 7);
        assert!(i16::from_value(Value::BigInt(7)).is_err());
    }

    #[test]
    fn stream_value_is_single_use() {
        let v = StreamValue::new(&b"hello"[..]);
        assert_eq!(v.take_bytes().unwrap(), b"hello");
        assert!(v.is_consumed());
        assert!(matches!(v.take_bytes(), Err(FragError::StreamConsumed)));
    }

    #[test]
    fn custom_value_downcasts() {
        let v = CustomValue::new(42_i32);
        assert_eq!(v.downcast_ref::<i32>(), Some(&42));
        assert_eq!(v.type_id(), TypeId::of::<i32>());
    }

    #[test]
    fn display_quotes_text() {
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::list(vec![1, 2]).to_string(), "[1, 2]");
    }
}
