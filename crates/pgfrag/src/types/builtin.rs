use super::{BoundType, TypeBinding, TypeRegistry};
use crate::error::{FragError, FragResult};
use crate::value::{CustomValue, FromValue, StreamValue, Value, ValueKind};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::any::TypeId;
use std::error::Error;
use std::fmt;
use std::io::Cursor;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type ReadFn = fn(&Row, usize) -> Result<Option<Value>, tokio_postgres::Error>;
type CoerceFn = fn(Value) -> FragResult<Value>;

macro_rules! declared {
    ($($ty:ty),* $(,)?) => {
        vec![$(TypeId::of::<$ty>(), TypeId::of::<Option<$ty>>()),*]
    };
}

fn column_name(row: &Row, idx: usize) -> String {
    row.columns()
        .get(idx)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| idx.to_string())
}

/// A binding for a single-position value with one `Value` variant.
struct ScalarBinding {
    name: &'static str,
    kind: ValueKind,
    declared: Vec<TypeId>,
    pg_types: Vec<Type>,
    read: ReadFn,
    coerce: CoerceFn,
    thread_safe: bool,
}

impl ScalarBinding {
    fn new(
        name: &'static str,
        kind: ValueKind,
        declared: Vec<TypeId>,
        pg_types: Vec<Type>,
        read: ReadFn,
        coerce: CoerceFn,
    ) -> Self {
        Self {
            name,
            kind,
            declared,
            pg_types,
            read,
            coerce,
            thread_safe: true,
        }
    }

    fn not_thread_safe(mut self) -> Self {
        self.thread_safe = false;
        self
    }
}

impl TypeBinding for ScalarBinding {
    fn name(&self) -> &str {
        self.name
    }

    fn value_kind(&self) -> ValueKind {
        self.kind
    }

    fn declared_types(&self) -> Vec<TypeId> {
        self.declared.clone()
    }

    fn pg_types(&self) -> Vec<Type> {
        self.pg_types.clone()
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    fn read(&self, row: &Row, idx: usize) -> FragResult<Value> {
        (self.read)(row, idx)
            .map(Option::unwrap_or_default)
            .map_err(|e| FragError::decode(column_name(row, idx), e.to_string()))
    }

    fn coerce(&self, value: Value) -> FragResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        (self.coerce)(value)
    }
}

/// `NULL`: binds SQL NULL, reads nothing else.
pub(super) struct NullBinding;

impl TypeBinding for NullBinding {
    fn name(&self) -> &str {
        "NULL"
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Null
    }

    fn read(&self, _row: &Row, _idx: usize) -> FragResult<Value> {
        Ok(Value::Null)
    }
}

/// `LIST`: expands to one positional parameter per element.
struct ListBinding;

fn read_array<T>(row: &Row, idx: usize) -> Result<Option<Value>, tokio_postgres::Error>
where
    T: for<'a> FromSql<'a> + Into<Value>,
{
    Ok(row
        .try_get::<_, Option<Vec<Option<T>>>>(idx)?
        .map(|items| Value::List(items.into_iter().map(Value::from).collect())))
}

impl TypeBinding for ListBinding {
    fn name(&self) -> &str {
        "LIST"
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::List
    }

    fn declared_types(&self) -> Vec<TypeId> {
        declared![
            Vec<bool>,
            Vec<i16>,
            Vec<i32>,
            Vec<i64>,
            Vec<f32>,
            Vec<f64>,
            Vec<Decimal>,
            Vec<String>,
            Vec<Uuid>,
            Vec<Value>,
        ]
    }

    fn pg_types(&self) -> Vec<Type> {
        vec![
            Type::BOOL_ARRAY,
            Type::INT2_ARRAY,
            Type::INT4_ARRAY,
            Type::INT8_ARRAY,
            Type::FLOAT4_ARRAY,
            Type::FLOAT8_ARRAY,
            Type::NUMERIC_ARRAY,
            Type::TEXT_ARRAY,
            Type::VARCHAR_ARRAY,
            Type::UUID_ARRAY,
        ]
    }

    fn is_expansion(&self) -> bool {
        true
    }

    fn positions(&self, value: &Value) -> usize {
        match value {
            Value::List(items) => items.len(),
            _ => 1,
        }
    }

    fn write(
        &self,
        registry: &TypeRegistry,
        out: &mut Vec<Value>,
        value: &Value,
    ) -> FragResult<usize> {
        let Value::List(items) = value else {
            out.push(value.clone());
            return Ok(1);
        };
        let mut written = 0;
        for item in items {
            let ty = registry.select_for_value(item);
            if ty.is_expansion() {
                return Err(FragError::NestedExpansion {
                    placeholder: String::new(),
                });
            }
            written += ty.write(registry, out, item)?;
        }
        Ok(written)
    }

    fn read(&self, row: &Row, idx: usize) -> FragResult<Value> {
        let ty = row
            .columns()
            .get(idx)
            .map(|c| c.type_().clone())
            .ok_or_else(|| FragError::decode(idx.to_string(), "column index out of range"))?;
        let read = match ty {
            Type::BOOL_ARRAY => read_array::<bool>(row, idx),
            Type::INT2_ARRAY => read_array::<i16>(row, idx),
            Type::INT4_ARRAY => read_array::<i32>(row, idx),
            Type::INT8_ARRAY => read_array::<i64>(row, idx),
            Type::FLOAT4_ARRAY => read_array::<f32>(row, idx),
            Type::FLOAT8_ARRAY => read_array::<f64>(row, idx),
            Type::NUMERIC_ARRAY => read_array::<Decimal>(row, idx),
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => read_array::<String>(row, idx),
            Type::UUID_ARRAY => read_array::<Uuid>(row, idx),
            other => {
                return Err(FragError::decode(
                    column_name(row, idx),
                    format!("cannot read {other} as LIST"),
                ));
            }
        };
        read.map(Option::unwrap_or_default)
            .map_err(|e| FragError::decode(column_name(row, idx), e.to_string()))
    }
}

/// `OBJECT`: generic fallback for values without a dedicated binding.
///
/// Binds through the value's own `ToSql`; reads unknown column types as [`RawValue`].
pub(super) struct ObjectBinding;

impl TypeBinding for ObjectBinding {
    fn name(&self) -> &str {
        "OBJECT"
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Custom
    }

    fn accepts(&self, _value: &Value) -> bool {
        true
    }

    fn read(&self, row: &Row, idx: usize) -> FragResult<Value> {
        row.try_get::<_, Option<RawValue>>(idx)
            .map(|raw| raw.map_or(Value::Null, Value::custom))
            .map_err(|e| FragError::decode(column_name(row, idx), e.to_string()))
    }
}

/// Undecoded column value of a type the registry has no binding for.
///
/// Binding it back sends the same bytes, provided the parameter has the same type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    ty: Type,
    bytes: Vec<u8>,
}

impl RawValue {
    pub fn pg_type(&self) -> &Type {
        &self.ty
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self {
            ty: ty.clone(),
            bytes: raw.to_vec(),
        })
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl ToSql for RawValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if *ty != self.ty {
            return Err(format!("raw {} value cannot be bound as {ty}", self.ty).into());
        }
        out.extend_from_slice(&self.bytes);
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Binding for an application type that implements `ToSql` and `FromSql` itself.
pub struct CustomBinding<T> {
    name: &'static str,
    pg_types: Vec<Type>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CustomBinding<T> {
    pub fn new(name: &'static str, pg_types: Vec<Type>) -> Self {
        Self {
            name,
            pg_types,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for CustomBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomBinding")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> TypeBinding for CustomBinding<T>
where
    T: ToSql + for<'a> FromSql<'a> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Custom
    }

    fn custom_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }

    fn declared_types(&self) -> Vec<TypeId> {
        declared![T]
    }

    fn pg_types(&self) -> Vec<Type> {
        self.pg_types.clone()
    }

    fn read(&self, row: &Row, idx: usize) -> FragResult<Value> {
        row.try_get::<_, Option<T>>(idx)
            .map(|v| v.map_or(Value::Null, |v| Value::Custom(CustomValue::new(v))))
            .map_err(|e| FragError::decode(column_name(row, idx), e.to_string()))
    }
}

pub(super) fn standard_bindings() -> Vec<BoundType> {
    vec![
        BoundType::new(NullBinding),
        BoundType::new(ScalarBinding::new(
            "BOOLEAN",
            ValueKind::Bool,
            declared![bool],
            vec![Type::BOOL],
            |row, idx| Ok(row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool)),
            |v| bool::from_value(v).map(Value::Bool),
        )),
        BoundType::new(ScalarBinding::new(
            "SMALLINT",
            ValueKind::SmallInt,
            declared![i16],
            vec![Type::INT2],
            |row, idx| Ok(row.try_get::<_, Option<i16>>(idx)?.map(Value::SmallInt)),
            |v| i16::from_value(v).map(Value::SmallInt),
        )),
        BoundType::new(ScalarBinding::new(
            "INTEGER",
            ValueKind::Int,
            declared![i32],
            vec![Type::INT4],
            |row, idx| Ok(row.try_get::<_, Option<i32>>(idx)?.map(Value::Int)),
            |v| i32::from_value(v).map(Value::Int),
        )),
        BoundType::new(ScalarBinding::new(
            "BIGINT",
            ValueKind::BigInt,
            declared![i64],
            vec![Type::INT8],
            |row, idx| Ok(row.try_get::<_, Option<i64>>(idx)?.map(Value::BigInt)),
            |v| i64::from_value(v).map(Value::BigInt),
        )),
        BoundType::new(ScalarBinding::new(
            "REAL",
            ValueKind::Real,
            declared![f32],
            vec![Type::FLOAT4],
            |row, idx| Ok(row.try_get::<_, Option<f32>>(idx)?.map(Value::Real)),
            |v| f32::from_value(v).map(Value::Real),
        )),
        BoundType::new(ScalarBinding::new(
            "DOUBLE",
            ValueKind::Double,
            declared![f64],
            vec![Type::FLOAT8],
            |row, idx| Ok(row.try_get::<_, Option<f64>>(idx)?.map(Value::Double)),
            |v| f64::from_value(v).map(Value::Double),
        )),
        BoundType::new(ScalarBinding::new(
            "NUMERIC",
            ValueKind::Numeric,
            declared![Decimal],
            vec![Type::NUMERIC],
            |row, idx| Ok(row.try_get::<_, Option<Decimal>>(idx)?.map(Value::Numeric)),
            |v| Decimal::from_value(v).map(Value::Numeric),
        )),
        BoundType::new(ScalarBinding::new(
            "VARCHAR",
            ValueKind::Text,
            declared![String],
            vec![Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME],
            |row, idx| Ok(row.try_get::<_, Option<String>>(idx)?.map(Value::Text)),
            |v| String::from_value(v).map(Value::Text),
        )),
        BoundType::new(ScalarBinding::new(
            "BYTES",
            ValueKind::Bytes,
            declared![Vec<u8>],
            vec![Type::BYTEA],
            |row, idx| Ok(row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes)),
            |v| Vec::<u8>::from_value(v).map(Value::Bytes),
        )),
        BoundType::new(ScalarBinding::new(
            "UUID",
            ValueKind::Uuid,
            declared![Uuid],
            vec![Type::UUID],
            |row, idx| Ok(row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid)),
            |v| Uuid::from_value(v).map(Value::Uuid),
        )),
        BoundType::new(ScalarBinding::new(
            "JSON",
            ValueKind::Json,
            declared![serde_json::Value],
            vec![Type::JSON, Type::JSONB],
            |row, idx| {
                Ok(row
                    .try_get::<_, Option<serde_json::Value>>(idx)?
                    .map(Value::Json))
            },
            |v| serde_json::Value::from_value(v).map(Value::Json),
        )),
        BoundType::new(ScalarBinding::new(
            "DATE",
            ValueKind::Date,
            declared![NaiveDate],
            vec![Type::DATE],
            |row, idx| Ok(row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date)),
            |v| NaiveDate::from_value(v).map(Value::Date),
        )),
        BoundType::new(ScalarBinding::new(
            "TIME",
            ValueKind::Time,
            declared![NaiveTime],
            vec![Type::TIME],
            |row, idx| Ok(row.try_get::<_, Option<NaiveTime>>(idx)?.map(Value::Time)),
            |v| NaiveTime::from_value(v).map(Value::Time),
        )),
        BoundType::new(ScalarBinding::new(
            "TIMESTAMP",
            ValueKind::Timestamp,
            declared![NaiveDateTime],
            vec![Type::TIMESTAMP],
            |row, idx| {
                Ok(row
                    .try_get::<_, Option<NaiveDateTime>>(idx)?
                    .map(Value::Timestamp))
            },
            |v| NaiveDateTime::from_value(v).map(Value::Timestamp),
        )),
        BoundType::new(ScalarBinding::new(
            "TIMESTAMPTZ",
            ValueKind::TimestampTz,
            declared![DateTime<Utc>],
            vec![Type::TIMESTAMPTZ],
            |row, idx| {
                Ok(row
                    .try_get::<_, Option<DateTime<Utc>>>(idx)?
                    .map(Value::TimestampTz))
            },
            |v| DateTime::<Utc>::from_value(v).map(Value::TimestampTz),
        )),
        BoundType::new(ScalarBinding::new(
            "BLOB",
            ValueKind::Blob,
            declared![Bytes],
            Vec::new(),
            |row, idx| {
                Ok(row
                    .try_get::<_, Option<Vec<u8>>>(idx)?
                    .map(|b| Value::Blob(Bytes::from(b))))
            },
            |v| Bytes::from_value(v).map(Value::Blob),
        )),
        BoundType::new(ScalarBinding::new(
            "CLOB",
            ValueKind::Clob,
            declared![Arc<str>],
            Vec::new(),
            |row, idx| {
                Ok(row
                    .try_get::<_, Option<String>>(idx)?
                    .map(|s| Value::Clob(Arc::from(s))))
            },
            |v| String::from_value(v).map(|s| Value::Clob(Arc::from(s))),
        )),
        BoundType::new(
            ScalarBinding::new(
                "BINARY_STREAM",
                ValueKind::BinaryStream,
                Vec::new(),
                Vec::new(),
                |row, idx| {
                    Ok(row
                        .try_get::<_, Option<Vec<u8>>>(idx)?
                        .map(|b| Value::BinaryStream(StreamValue::new(Cursor::new(b)))))
                },
                |v| match v {
                    Value::BinaryStream(s) => Ok(Value::BinaryStream(s)),
                    other => Vec::<u8>::from_value(other)
                        .map(|b| Value::BinaryStream(StreamValue::new(Cursor::new(b)))),
                },
            )
            .not_thread_safe(),
        ),
        BoundType::new(
            ScalarBinding::new(
                "CHARACTER_STREAM",
                ValueKind::CharacterStream,
                Vec::new(),
                Vec::new(),
                |row, idx| {
                    Ok(row.try_get::<_, Option<String>>(idx)?.map(|s| {
                        Value::CharacterStream(StreamValue::new(Cursor::new(s.into_bytes())))
                    }))
                },
                |v| match v {
                    Value::CharacterStream(s) => Ok(Value::CharacterStream(s)),
                    other => String::from_value(other).map(|s| {
                        Value::CharacterStream(StreamValue::new(Cursor::new(s.into_bytes())))
                    }),
                },
            )
            .not_thread_safe(),
        ),
        BoundType::new(ListBinding),
        BoundType::new(ObjectBinding),
    ]
}
