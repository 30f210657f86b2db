//! Query catalog: named statements described up front.
//!
//! A [`QueryDescriptor`] names a template and declares the type of each placeholder, the
//! way a build-time generator describes the query methods it emits. Registering a
//! descriptor validates it once; binding it later checks the supplied values against
//! the declared types and builds the fragment.
//!
//! Descriptors known at compile time can be submitted with `inventory` and loaded with
//! [`QueryCatalog::from_inventory`].
//!
//! # Example
//!
//! ```ignore
//! use pgfrag::{QueryCatalog, QueryDescriptor, ParamDescriptor, bindings};
//!
//! let mut catalog = QueryCatalog::new();
//! catalog.register(
//!     QueryDescriptor::new("users.by_ids", "SELECT * FROM users WHERE id IN (:ids)")
//!         .param(ParamDescriptor::list("ids", "BIGINT")),
//! )?;
//!
//! let users = catalog
//!     .handle("users.by_ids", &bindings! { "ids" => vec![1_i64, 2] }, &endpoint, ResultShape::from_record())?
//!     .list()
//!     .await?;
//! ```
//!
//! Static registration:
//!
//! ```ignore
//! inventory::submit! {
//!     pgfrag::StaticQuery {
//!         name: "users.count",
//!         template: "SELECT count(*) FROM users WHERE status = :status",
//!         params: &[pgfrag::StaticParam { name: "status", type_name: "VARCHAR", argument_type_name: None }],
//!         confidential: false,
//!     }
//! }
//! ```

use crate::endpoint::Endpoint;
use crate::error::{FragError, FragResult};
use crate::finder::PlaceholderFinder;
use crate::fragment::{Bindings, DeclaredType, SqlFragment};
use crate::handle::QueryHandle;
use crate::materialize::ResultShape;
use crate::types::TypeRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Declared type of one placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    /// Catalog type name, e.g. `BIGINT` or `LIST`.
    pub type_name: String,
    /// Element type of a `LIST` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_type_name: Option<String>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            argument_type_name: None,
        }
    }

    /// A `LIST` parameter whose elements are `element_type`.
    pub fn list(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: "LIST".to_string(),
            argument_type_name: Some(element_type.into()),
        }
    }
}

/// A named statement and its parameter layout.
///
/// Serializable so a generator can ship descriptors as JSON, see
/// [`QueryCatalog::register_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
    /// Keep bound values out of diagnostics.
    #[serde(default)]
    pub confidential: bool,
}

impl QueryDescriptor {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            params: Vec::new(),
            confidential: false,
        }
    }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn confidential(mut self) -> Self {
        self.confidential = true;
        self
    }
}

/// Compile-time parameter descriptor, see [`StaticQuery`].
#[derive(Debug, Clone, Copy)]
pub struct StaticParam {
    pub name: &'static str,
    pub type_name: &'static str,
    pub argument_type_name: Option<&'static str>,
}

/// Compile-time query descriptor, collected with `inventory::submit!`.
#[derive(Debug, Clone, Copy)]
pub struct StaticQuery {
    pub name: &'static str,
    pub template: &'static str,
    pub params: &'static [StaticParam],
    pub confidential: bool,
}

inventory::collect!(StaticQuery);

impl From<&StaticQuery> for QueryDescriptor {
    fn from(q: &StaticQuery) -> Self {
        Self {
            name: q.name.to_string(),
            template: q.template.to_string(),
            params: q
                .params
                .iter()
                .map(|p| ParamDescriptor {
                    name: p.name.to_string(),
                    type_name: p.type_name.to_string(),
                    argument_type_name: p.argument_type_name.map(str::to_string),
                })
                .collect(),
            confidential: q.confidential,
        }
    }
}

struct Entry {
    descriptor: QueryDescriptor,
    declared: HashMap<String, DeclaredType>,
}

/// Registry of validated query descriptors.
pub struct QueryCatalog {
    registry: Arc<TypeRegistry>,
    entries: HashMap<String, Entry>,
}

impl Default for QueryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCatalog {
    /// An empty catalog using the standard type registry.
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::standard_shared())
    }

    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            entries: HashMap::new(),
        }
    }

    /// A catalog holding every submitted [`StaticQuery`].
    pub fn from_inventory() -> FragResult<Self> {
        let mut catalog = Self::new();
        catalog.load_inventory()?;
        Ok(catalog)
    }

    /// Register every submitted [`StaticQuery`].
    pub fn load_inventory(&mut self) -> FragResult<()> {
        for q in inventory::iter::<StaticQuery> {
            self.register(QueryDescriptor::from(q))?;
        }
        Ok(())
    }

    /// Validate and add a descriptor.
    ///
    /// Fails when the name is taken, a declared type name is unknown, or the template
    /// uses a placeholder that is not declared.
    pub fn register(&mut self, descriptor: QueryDescriptor) -> FragResult<()> {
        if self.entries.contains_key(&descriptor.name) {
            return Err(FragError::DuplicateQuery(descriptor.name));
        }

        let mut declared = HashMap::with_capacity(descriptor.params.len());
        for param in &descriptor.params {
            let bound_type = self.registry.by_name(&param.type_name)?.clone();
            let argument_type = param
                .argument_type_name
                .as_deref()
                .map(|name| self.registry.argument_type_by_name(name).cloned())
                .transpose()?;
            declared.insert(
                param.name.clone(),
                DeclaredType {
                    bound_type,
                    argument_type,
                },
            );
        }

        for found in PlaceholderFinder::new(&descriptor.template).placeholders() {
            if !declared.contains_key(found.name) {
                return Err(FragError::placeholder_not_found(found.name));
            }
            if let Some(hint) = found.type_hint {
                self.registry.by_name(hint)?;
            }
            if let Some(hint) = found.argument_hint {
                self.registry.argument_type_by_name(hint)?;
            }
        }

        tracing::debug!(
            target: "pgfrag.sql",
            query = %descriptor.name,
            params = descriptor.params.len(),
            "registered query"
        );
        self.entries.insert(
            descriptor.name.clone(),
            Entry {
                descriptor,
                declared,
            },
        );
        Ok(())
    }

    /// Register every descriptor in a JSON array.
    pub fn register_json(&mut self, json: &str) -> FragResult<()> {
        let descriptors: Vec<QueryDescriptor> = serde_json::from_str(json)
            .map_err(|e| FragError::Other(format!("invalid query descriptors: {e}")))?;
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&QueryDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered query names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the fragment for `name`, checking `bindings` against the declared types.
    pub fn bind(&self, name: &str, bindings: &Bindings) -> FragResult<SqlFragment> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FragError::UnknownQuery(name.to_string()))?;
        let fragment = SqlFragment::build(
            &self.registry,
            &entry.descriptor.template,
            bindings,
            &entry.declared,
        )?;
        Ok(if entry.descriptor.confidential {
            fragment.confidential()
        } else {
            fragment
        })
    }

    /// Bind `name` and wrap it in a handle for `endpoint`.
    pub fn handle<T>(
        &self,
        name: &str,
        bindings: &Bindings,
        endpoint: &Endpoint,
        shape: ResultShape<T>,
    ) -> FragResult<QueryHandle<T>> {
        Ok(endpoint.query(self.bind(name, bindings)?, shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings;
    use crate::value::Value;

    inventory::submit! {
        StaticQuery {
            name: "test.static_count",
            template: "SELECT count(*) FROM users WHERE status = :status",
            params: &[StaticParam { name: "status", type_name: "VARCHAR", argument_type_name: None }],
            confidential: false,
        }
    }

    fn catalog() -> QueryCatalog {
        let mut c = QueryCatalog::new();
        c.register(
            QueryDescriptor::new("users.by_ids", "SELECT * FROM users WHERE id IN (:ids)")
                .param(ParamDescriptor::list("ids", "BIGINT")),
        )
        .unwrap();
        c.register(
            QueryDescriptor::new(
                "users.by_email",
                "SELECT * FROM users WHERE email = :email AND org = :org",
            )
            .param(ParamDescriptor::new("email", "VARCHAR"))
            .param(ParamDescriptor::new("org", "BIGINT"))
            .confidential(),
        )
        .unwrap();
        c
    }

    #[test]
    fn bind_applies_declared_types() {
        let c = catalog();
        let f = c
            .bind("users.by_ids", &bindings! { "ids" => vec![1, 2] })
            .unwrap();
        assert_eq!(f.sql(), "SELECT * FROM users WHERE id IN (?, ?)");
        assert_eq!(f.params(), vec![Value::BigInt(1), Value::BigInt(2)]);
    }

    #[test]
    fn typed_null_takes_the_declared_type() {
        let c = catalog();
        let f = c
            .bind(
                "users.by_email",
                &bindings! { "email" => "a@b.c", "org" => Value::Null },
            )
            .unwrap();
        assert_eq!(f.bound_values()[1].0.name(), "BIGINT");
        assert!(f.is_confidential());
    }

    #[test]
    fn bind_rejects_mismatched_values() {
        let c = catalog();
        match c.bind("users.by_email", &bindings! { "email" => 5, "org" => 1 }) {
            Err(FragError::TypeMismatch {
                placeholder,
                expected,
                found,
            }) => {
                assert_eq!(placeholder, "email");
                assert_eq!(expected, "VARCHAR");
                assert_eq!(found, Value::Int(5).type_label());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            c.bind("users.by_ids", &bindings! { "ids" => 1 }),
            Err(FragError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn register_validates_descriptors() {
        let mut c = catalog();
        assert!(matches!(
            c.register(QueryDescriptor::new("users.by_ids", "SELECT 1")),
            Err(FragError::DuplicateQuery(name)) if name == "users.by_ids"
        ));
        assert!(matches!(
            c.register(
                QueryDescriptor::new("bad.type", "SELECT :x")
                    .param(ParamDescriptor::new("x", "NOPE"))
            ),
            Err(FragError::UnknownTypeName { .. })
        ));
        assert!(matches!(
            c.register(QueryDescriptor::new("bad.placeholder", "SELECT :x")),
            Err(FragError::PlaceholderNotFound { name }) if name == "x"
        ));
        assert!(matches!(
            c.register(
                QueryDescriptor::new("bad.list", "SELECT :x")
                    .param(ParamDescriptor::list("x", "LIST"))
            ),
            Err(FragError::UnknownTypeName { .. })
        ));
        assert!(!c.contains("bad.type"));
    }

    #[test]
    fn unknown_query_fails() {
        assert!(matches!(
            catalog().bind("nope", &Bindings::new()),
            Err(FragError::UnknownQuery(name)) if name == "nope"
        ));
    }

    #[test]
    fn json_descriptors_are_registered() {
        let mut c = QueryCatalog::new();
        c.register_json(
            r#"[
                {"name": "tags.by_ids", "template": "SELECT * FROM tags WHERE id IN (:ids)",
                 "params": [{"name": "ids", "type_name": "LIST", "argument_type_name": "INTEGER"}]},
                {"name": "tags.all", "template": "SELECT * FROM tags", "confidential": true}
            ]"#,
        )
        .unwrap();
        assert_eq!(c.names(), vec!["tags.all", "tags.by_ids"]);
        assert!(c.get("tags.all").unwrap().confidential);
        assert_eq!(
            c.get("tags.by_ids").unwrap().params[0],
            ParamDescriptor::list("ids", "INTEGER")
        );
        assert!(matches!(c.register_json("{"), Err(FragError::Other(_))));
    }

    #[test]
    fn inventory_queries_are_loaded() {
        let c = QueryCatalog::from_inventory().unwrap();
        let d = c.get("test.static_count").unwrap();
        assert_eq!(d.params[0].type_name, "VARCHAR");
        assert!(c.names().contains(&"test.static_count"));
    }
}
