//! Result materializer: turns [`Record`]s into caller types.
//!
//! A [`ResultShape`] is either a plain mapping function or a [`GeneratedShape`], the
//! descriptor an external code generator hands over for its result types. Generated
//! shapes build values one of two ways:
//! - **construct**: a row-accepting constructor (any [`FromRecord`] type), or
//! - **populate**: `T::default()` followed by one setter per field, where each field is
//!   read with the type binding resolved for its declared Rust type.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! struct User {
//!     id: i64,
//!     email: Option<String>,
//! }
//!
//! let shape = GeneratedShape::populate(
//!     TypeRegistry::standard(),
//!     [
//!         FieldDescriptor::new("id", |u: &mut User, v: i64| u.id = v),
//!         FieldDescriptor::new("email", |u: &mut User, v: Option<String>| u.email = v),
//!     ],
//! )?;
//! let users: Vec<User> = endpoint.query(fragment, shape.into()).list().await?;
//! ```

use crate::error::{FragError, FragResult};
use crate::record::{FromRecord, Record};
use crate::types::{BoundType, TypeRegistry};
use crate::value::{FromValue, Value};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

type RowFn<T> = Arc<dyn Fn(&Record) -> FragResult<T> + Send + Sync>;
type SetFn<T> = Arc<dyn Fn(&mut T, Value) -> FragResult<()> + Send + Sync>;

/// How rows become values of `T`.
pub enum ResultShape<T> {
    /// Caller-supplied row function.
    Mapper(RowFn<T>),
    /// Descriptor of a generated result type.
    Generated(GeneratedShape<T>),
}

impl<T> Clone for ResultShape<T> {
    fn clone(&self) -> Self {
        match self {
            ResultShape::Mapper(f) => ResultShape::Mapper(f.clone()),
            ResultShape::Generated(g) => ResultShape::Generated(g.clone()),
        }
    }
}

impl<T> fmt::Debug for ResultShape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultShape::Mapper(_) => f.write_str("ResultShape::Mapper"),
            ResultShape::Generated(g) => f.debug_tuple("ResultShape::Generated").field(g).finish(),
        }
    }
}

impl<T> ResultShape<T> {
    pub fn mapper(f: impl Fn(&Record) -> FragResult<T> + Send + Sync + 'static) -> Self {
        ResultShape::Mapper(Arc::new(f))
    }

    /// Materialize one row.
    pub fn materialize(&self, record: &Record) -> FragResult<T> {
        match self {
            ResultShape::Mapper(f) => f(record),
            ResultShape::Generated(g) => g.materialize(record),
        }
    }
}

impl<T: FromRecord + 'static> ResultShape<T> {
    /// Shape for a type with a row-accepting constructor.
    pub fn from_record() -> Self {
        ResultShape::Generated(GeneratedShape::from_record())
    }
}

impl<T> From<GeneratedShape<T>> for ResultShape<T> {
    fn from(shape: GeneratedShape<T>) -> Self {
        ResultShape::Generated(shape)
    }
}

/// Descriptor of a generated result type.
pub struct GeneratedShape<T> {
    type_name: &'static str,
    strategy: Strategy<T>,
}

enum Strategy<T> {
    Construct(RowFn<T>),
    Populate {
        new: fn() -> T,
        fields: Arc<[ResolvedField<T>]>,
    },
}

struct ResolvedField<T> {
    name: String,
    bound_type: BoundType,
    set: SetFn<T>,
}

impl<T> Clone for GeneratedShape<T> {
    fn clone(&self) -> Self {
        let strategy = match &self.strategy {
            Strategy::Construct(f) => Strategy::Construct(f.clone()),
            Strategy::Populate { new, fields } => Strategy::Populate {
                new: *new,
                fields: fields.clone(),
            },
        };
        Self {
            type_name: self.type_name,
            strategy,
        }
    }
}

impl<T> fmt::Debug for GeneratedShape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("GeneratedShape");
        d.field("type_name", &self.type_name);
        match &self.strategy {
            Strategy::Construct(_) => d.field("strategy", &"construct"),
            Strategy::Populate { fields, .. } => d.field(
                "fields",
                &fields
                    .iter()
                    .map(|f| (f.name.as_str(), f.bound_type.name()))
                    .collect::<Vec<_>>(),
            ),
        };
        d.finish()
    }
}

impl<T: 'static> GeneratedShape<T> {
    /// Build values with a row-accepting constructor.
    pub fn construct(f: fn(&Record) -> FragResult<T>) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            strategy: Strategy::Construct(Arc::new(f)),
        }
    }

    /// Build values with `T::default()` and per-field setters.
    ///
    /// Every field's declared type must have a binding in `registry`, otherwise this
    /// fails with [`FragError::UnknownType`].
    pub fn populate(
        registry: &TypeRegistry,
        fields: impl IntoIterator<Item = FieldDescriptor<T>>,
    ) -> FragResult<Self>
    where
        T: Default,
    {
        let fields = fields
            .into_iter()
            .map(|field| {
                let bound_type = registry
                    .select_for_declared_type(field.type_id, field.type_name)?
                    .clone();
                Ok(ResolvedField {
                    name: field.name,
                    bound_type,
                    set: field.set,
                })
            })
            .collect::<FragResult<Vec<_>>>()?;
        Ok(Self {
            type_name: std::any::type_name::<T>(),
            strategy: Strategy::Populate {
                new: T::default,
                fields: fields.into(),
            },
        })
    }
}

impl<T> GeneratedShape<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn materialize(&self, record: &Record) -> FragResult<T> {
        match &self.strategy {
            Strategy::Construct(f) => f(record),
            Strategy::Populate { new, fields } => {
                let mut out = new();
                for field in fields.iter() {
                    let value = field.bound_type.read_record(record, &field.name)?;
                    (field.set)(&mut out, value).map_err(|e| match e {
                        FragError::Decode { message, .. } => FragError::decode(&field.name, message),
                        other => other,
                    })?;
                }
                Ok(out)
            }
        }
    }
}

impl<T: FromRecord + 'static> GeneratedShape<T> {
    pub fn from_record() -> Self {
        Self::construct(T::from_record)
    }
}

/// One field of a populated result type: column name, declared type, setter.
pub struct FieldDescriptor<T> {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    set: SetFn<T>,
}

impl<T: 'static> FieldDescriptor<T> {
    /// Describe a field whose declared type is `F`.
    pub fn new<F: FromValue + 'static>(name: impl Into<String>, setter: fn(&mut T, F)) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<F>(),
            type_name: std::any::type_name::<F>(),
            set: Arc::new(move |target, value| {
                setter(target, F::from_value(value)?);
                Ok(())
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct User {
        id: i64,
        name: String,
        email: Option<String>,
    }

    impl FromRecord for User {
        fn from_record(record: &Record) -> FragResult<Self> {
            Ok(Self {
                id: record.try_get("id")?,
                name: record.try_get("name")?,
                email: record.try_get("email")?,
            })
        }
    }

    fn user_record() -> Record {
        Record::from_pairs([
            ("id", Value::Int(1)),
            ("name", Value::from("ann")),
            ("email", Value::Null),
        ])
    }

    fn expected() -> User {
        User {
            id: 1,
            name: "ann".into(),
            email: None,
        }
    }

    #[test]
    fn mapper_shape_calls_the_function() {
        let shape = ResultShape::mapper(|r| r.try_get::<i64>("id"));
        assert_eq!(shape.materialize(&user_record()).unwrap(), 1);
    }

    #[test]
    fn construct_shape_uses_from_record() {
        let shape = ResultShape::<User>::from_record();
        assert_eq!(shape.materialize(&user_record()).unwrap(), expected());
    }

    #[test]
    fn populate_shape_sets_each_field() {
        let shape = GeneratedShape::populate(
            TypeRegistry::standard(),
            [
                FieldDescriptor::new("id", |u: &mut User, v: i64| u.id = v),
                FieldDescriptor::new("name", |u: &mut User, v: String| u.name = v),
                FieldDescriptor::new("email", |u: &mut User, v: Option<String>| u.email = v),
            ],
        )
        .unwrap();
        assert_eq!(shape.materialize(&user_record()).unwrap(), expected());
    }

    fn materialize_any<T>(shape: &ResultShape<T>, record: &Record) -> FragResult<T> {
        shape.materialize(record)
    }

    fn first_name<'a>() -> ResultShape<&'a str> {
        ResultShape::mapper(|r| match r.value("name") {
            Some(Value::Text(_)) => Ok("named"),
            _ => Ok("anonymous"),
        })
    }

    #[test]
    fn shapes_materialize_without_static_bounds() {
        assert_eq!(materialize_any(&first_name(), &user_record()).unwrap(), "named");
        let generated = ResultShape::<User>::from_record();
        assert_eq!(materialize_any(&generated, &user_record()).unwrap(), expected());
    }

    #[test]
    fn populate_reports_missing_column() {
        let shape = GeneratedShape::populate(
            TypeRegistry::standard(),
            [FieldDescriptor::new("age", |_: &mut User, _: i32| {})],
        )
        .unwrap();
        match shape.materialize(&user_record()) {
            Err(FragError::Decode { column, .. }) => assert_eq!(column, "age"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl FromValue for Opaque {
        fn from_value(_: Value) -> FragResult<Self> {
            Ok(Opaque)
        }
    }

    #[test]
    fn populate_rejects_undeclared_field_types() {
        let err = GeneratedShape::populate(
            TypeRegistry::standard(),
            [FieldDescriptor::new("x", |_: &mut User, _: Opaque| {})],
        )
        .unwrap_err();
        assert!(matches!(err, FragError::UnknownType { .. }));
    }
}
