use crate::value::Value;
use std::collections::HashMap;

/// One named value supplied to a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    /// Suppress this value from diagnostic previews.
    pub confidential: bool,
}

/// Name-to-value map consumed by fragment construction.
///
/// # Example
///
/// ```ignore
/// use pgfrag::{Bindings, SqlFragment};
///
/// let bindings = Bindings::new()
///     .bind("id", 5_i64)
///     .bind_confidential("token", secret);
/// let fragment = SqlFragment::new("SELECT * FROM sessions WHERE id = :id AND token = :token", &bindings)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: HashMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value (consuming version).
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind a value that must not appear in diagnostics (consuming version).
    pub fn bind_confidential(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(
            name.into(),
            Binding {
                value: value.into(),
                confidential: true,
            },
        );
        self
    }

    /// Bind a value, replacing any previous binding of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(
            name.into(),
            Binding {
                value: value.into(),
                confidential: false,
            },
        );
        self
    }

    pub fn entry(&self, name: &str) -> Option<&Binding> {
        self.entries.get(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|b| &b.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (k, v) in iter {
            bindings.insert(k, v);
        }
        bindings
    }
}

/// Build [`Bindings`] from `name => value` pairs.
///
/// ```ignore
/// let b = pgfrag::bindings! { "id" => 5, "name" => "ann" };
/// ```
#[macro_export]
macro_rules! bindings {
    () => {
        $crate::Bindings::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut bindings = $crate::Bindings::new();
        $( bindings.insert($name, $value); )+
        bindings
    }};
}
