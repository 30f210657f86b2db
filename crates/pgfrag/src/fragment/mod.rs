//! SQL fragments and their composition algebra.
//!
//! A [`SqlFragment`] is built from a template with named placeholders and a set of
//! [`Bindings`]. Construction resolves every placeholder up front: the result holds
//! literal text and typed, bound placeholders only, and it is never mutated afterwards.
//! Composition (`concat`, `and`, `or`, `substitute`) always returns a new fragment.
//!
//! # Example
//!
//! ```ignore
//! use pgfrag::{bindings, SqlFragment};
//!
//! let a = SqlFragment::new("a = :a", &bindings! { "a" => 1 })?;
//! let b = SqlFragment::new("b = :b", &bindings! { "b" => 2 })?;
//! let c = SqlFragment::new("c IN (:c)", &bindings! { "c" => vec![3, 4] })?;
//!
//! let cond = a.or(b).and(c);
//! assert_eq!(cond.sql(), "(a = ? OR b = ?) AND c IN (?, ?)");
//! assert_eq!(cond.to_pg_sql(), "(a = $1 OR b = $2) AND c IN ($3, $4)");
//! ```

mod bindings;
mod substitute;

#[cfg(test)]
mod tests;

pub use bindings::{Binding, Bindings};
pub use substitute::Substitutions;

use crate::error::{FragError, FragResult};
use crate::finder::{PlaceholderFinder, Token};
use crate::guard;
use crate::types::{BoundType, TypeRegistry};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// How positional parameters are spelled in rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamStyle {
    /// `?` for every position.
    #[default]
    Question,
    /// `$1`, `$2`, ... as Postgres expects.
    Numbered,
}

impl ParamStyle {
    fn write_marker(self, out: &mut String, index: usize) {
        match self {
            ParamStyle::Question => out.push('?'),
            ParamStyle::Numbered => {
                let _ = write!(out, "${index}");
            }
        }
    }
}

/// How a fragment was produced; decides parenthesization on later boolean joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositionKind {
    #[default]
    Plain,
    And,
    Or,
}

impl CompositionKind {
    pub fn is_boolean_join(self) -> bool {
        !matches!(self, CompositionKind::Plain)
    }

    fn separator(self) -> &'static str {
        match self {
            CompositionKind::And => " AND ",
            CompositionKind::Or => " OR ",
            CompositionKind::Plain => "",
        }
    }
}

/// A resolved placeholder.
#[derive(Debug, Clone)]
pub struct Placeholder {
    name: String,
    confidential: bool,
    render_expression: String,
    original_text: String,
    bound_type: BoundType,
    value: Value,
    hint: Option<BoundType>,
    params: Vec<Value>,
    thread_safe: bool,
}

impl Placeholder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_confidential(&self) -> bool {
        self.confidential
    }

    /// Rendered text with `?` markers (`?, ?` for an expanded list, `NULL` for an empty one).
    pub fn render_expression(&self) -> &str {
        &self.render_expression
    }

    /// The placeholder as written in the template, type hint included.
    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn bound_type(&self) -> &BoundType {
        &self.bound_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The type named by the placeholder's `/*HINT*/`, if any.
    pub fn hint(&self) -> Option<&BoundType> {
        self.hint.as_ref()
    }

    /// Positional parameters written for this placeholder.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn positions(&self) -> usize {
        self.params.len()
    }

    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    fn render_into(&self, out: &mut String, style: ParamStyle, next: &mut usize) {
        if self.params.is_empty() {
            out.push_str("NULL");
            return;
        }
        for i in 0..self.params.len() {
            if i > 0 {
                out.push_str(", ");
            }
            *next += 1;
            style.write_marker(out, *next);
        }
    }
}

/// Declared type of a placeholder, used when the template carries no type hint.
#[derive(Debug, Clone)]
pub(crate) struct DeclaredType {
    pub(crate) bound_type: BoundType,
    pub(crate) argument_type: Option<BoundType>,
}

/// One element of a fragment.
#[derive(Debug, Clone)]
pub enum Element {
    Text(String),
    Placeholder(Arc<Placeholder>),
}

/// An immutable, fully bound piece of SQL.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct SqlFragment {
    elements: Vec<Element>,
    kind: CompositionKind,
    confidential: bool,
}

impl SqlFragment {
    /// Build a fragment with the standard type registry.
    pub fn new(template: &str, bindings: &Bindings) -> FragResult<Self> {
        Self::with_registry(TypeRegistry::standard(), template, bindings)
    }

    /// Build a fragment, resolving types with `registry`.
    pub fn with_registry(
        registry: &TypeRegistry,
        template: &str,
        bindings: &Bindings,
    ) -> FragResult<Self> {
        Self::build(registry, template, bindings, &HashMap::new())
    }

    /// Build a fragment where `declared` supplies the type of placeholders written
    /// without a `/*HINT*/`.
    pub(crate) fn build(
        registry: &TypeRegistry,
        template: &str,
        bindings: &Bindings,
        declared: &HashMap<String, DeclaredType>,
    ) -> FragResult<Self> {
        let mut elements = Vec::new();
        for token in PlaceholderFinder::new(template).iter() {
            match token {
                Token::Text(text) => elements.push(Element::Text(text.to_string())),
                Token::Placeholder(found) => {
                    let binding = bindings
                        .entry(found.name)
                        .ok_or_else(|| FragError::placeholder_not_found(found.name))?;
                    let fallback = declared.get(found.name);
                    let hint = match found.type_hint {
                        Some(h) => Some(registry.by_name(h)?.clone()),
                        None => fallback.map(|d| d.bound_type.clone()),
                    };
                    let argument = match found.argument_hint {
                        Some(h) => Some(registry.argument_type_by_name(h)?.clone()),
                        None => fallback.and_then(|d| d.argument_type.clone()),
                    };
                    let placeholder = resolve(
                        registry,
                        found.name,
                        found.original,
                        binding.value.clone(),
                        binding.confidential,
                        hint,
                        argument.as_ref(),
                    )?;
                    elements.push(Element::Placeholder(Arc::new(placeholder)));
                }
            }
        }
        Ok(Self {
            elements,
            kind: CompositionKind::Plain,
            confidential: false,
        })
    }

    /// A literal fragment. `text` is not scanned for placeholders.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        let elements = if text.is_empty() {
            Vec::new()
        } else {
            vec![Element::Text(text)]
        };
        Self {
            elements,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn kind(&self) -> CompositionKind {
        self.kind
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.elements.iter().filter_map(|e| match e {
            Element::Placeholder(p) => Some(&**p),
            Element::Text(_) => None,
        })
    }

    /// Rendered SQL with `?` markers.
    pub fn sql(&self) -> String {
        self.render(ParamStyle::Question)
    }

    /// Rendered SQL with `$n` markers.
    pub fn to_pg_sql(&self) -> String {
        self.render(ParamStyle::Numbered)
    }

    /// Render with the given marker style. Markers are numbered left to right.
    pub fn render(&self, style: ParamStyle) -> String {
        let mut out = String::new();
        let mut next = 0;
        for element in &self.elements {
            match element {
                Element::Text(text) => out.push_str(text),
                Element::Placeholder(p) => p.render_into(&mut out, style, &mut next),
            }
        }
        out
    }

    /// The template text with placeholders spelled as written, for diagnostics.
    pub fn original(&self) -> String {
        let mut out = String::new();
        for element in &self.elements {
            match element {
                Element::Text(text) => out.push_str(text),
                Element::Placeholder(p) => out.push_str(&p.original_text),
            }
        }
        out
    }

    /// `(type, value)` for every placeholder, in order.
    pub fn bound_values(&self) -> Vec<(&BoundType, &Value)> {
        self.placeholders()
            .map(|p| (&p.bound_type, &p.value))
            .collect()
    }

    /// Positional parameters, one per rendered marker.
    pub fn params(&self) -> Vec<Value> {
        self.placeholders()
            .flat_map(|p| p.params.iter().cloned())
            .collect()
    }

    /// Number of positional parameters.
    pub fn positions(&self) -> usize {
        self.placeholders().map(Placeholder::positions).sum()
    }

    /// No placeholders and only empty text.
    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|e| match e {
            Element::Text(text) => text.is_empty(),
            Element::Placeholder(_) => false,
        })
    }

    /// No placeholders and only whitespace text.
    pub fn is_blank(&self) -> bool {
        self.elements.iter().all(|e| match e {
            Element::Text(text) => text.trim().is_empty(),
            Element::Placeholder(_) => false,
        })
    }

    pub fn contains_non_thread_safe_value(&self) -> bool {
        self.placeholders().any(|p| !p.thread_safe)
    }

    pub fn is_confidential(&self) -> bool {
        self.confidential || self.placeholders().any(|p| p.confidential)
    }

    /// Mark the whole fragment as confidential.
    pub fn confidential(mut self) -> Self {
        self.confidential = true;
        self
    }

    /// Append `other`. The result is a plain fragment.
    pub fn concat(mut self, other: SqlFragment) -> Self {
        self.elements.extend(other.elements);
        self.kind = CompositionKind::Plain;
        self.confidential |= other.confidential;
        self
    }

    /// Append `separator` and `other`.
    pub fn concat_with(self, separator: &str, other: SqlFragment) -> Self {
        self.concat(SqlFragment::text(separator)).concat(other)
    }

    pub fn and(self, other: SqlFragment) -> Self {
        self.join(CompositionKind::And, other)
    }

    pub fn or(self, other: SqlFragment) -> Self {
        self.join(CompositionKind::Or, other)
    }

    /// AND-join all fragments, skipping blank ones.
    pub fn and_all(fragments: impl IntoIterator<Item = SqlFragment>) -> Self {
        fragments
            .into_iter()
            .fold(SqlFragment::empty(), SqlFragment::and)
    }

    /// OR-join all fragments, skipping blank ones.
    pub fn or_all(fragments: impl IntoIterator<Item = SqlFragment>) -> Self {
        fragments
            .into_iter()
            .fold(SqlFragment::empty(), SqlFragment::or)
    }

    fn join(mut self, op: CompositionKind, mut other: SqlFragment) -> Self {
        if other.is_blank() {
            self.confidential |= other.confidential;
            return self;
        }
        if self.is_blank() {
            other.confidential |= self.confidential;
            return other;
        }
        let mut out = SqlFragment {
            elements: Vec::with_capacity(self.elements.len() + other.elements.len() + 5),
            kind: op,
            confidential: self.confidential || other.confidential,
        };
        out.push_guarded(self, op);
        out.elements.push(Element::Text(op.separator().to_string()));
        out.push_guarded(other, op);
        out
    }

    /// Wrap `operand` in parentheses when it is a boolean join of a different operator.
    fn push_guarded(&mut self, operand: SqlFragment, op: CompositionKind) {
        let wrap = operand.kind.is_boolean_join() && operand.kind != op;
        if wrap {
            self.elements.push(Element::Text("(".to_string()));
        }
        self.elements.extend(operand.elements);
        if wrap {
            self.elements.push(Element::Text(")".to_string()));
        }
    }

    /// Replace `${keyword}` markers in literal text with the mapped fragments.
    pub fn substitute(&self, substitutions: &Substitutions) -> FragResult<SqlFragment> {
        substitute::apply(self, substitutions)
    }

    pub(crate) fn from_parts(
        elements: Vec<Element>,
        kind: CompositionKind,
        confidential: bool,
    ) -> Self {
        Self {
            elements,
            kind,
            confidential,
        }
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

fn resolve(
    registry: &TypeRegistry,
    name: &str,
    original: &str,
    value: Value,
    confidential: bool,
    hint: Option<BoundType>,
    argument: Option<&BoundType>,
) -> FragResult<Placeholder> {
    let (bound_type, value) = match &hint {
        Some(hinted) if value.is_null() => (hinted.clone(), value),
        Some(hinted) if !hinted.is_expansion() => {
            let coerced = hinted.coerce(value.clone()).map_err(|_| FragError::TypeMismatch {
                placeholder: name.to_string(),
                expected: hinted.name().to_string(),
                found: value.type_label().to_string(),
            })?;
            (hinted.clone(), coerced)
        }
        Some(hinted) if !matches!(value, Value::List(_)) => {
            return Err(FragError::TypeMismatch {
                placeholder: name.to_string(),
                expected: hinted.name().to_string(),
                found: value.type_label().to_string(),
            });
        }
        _ => {
            let value = match (argument, value) {
                (Some(arg), Value::List(items)) => Value::List(
                    items
                        .into_iter()
                        .map(|item| {
                            let label = item.type_label().to_string();
                            arg.coerce(item).map_err(|_| FragError::TypeMismatch {
                                placeholder: name.to_string(),
                                expected: arg.name().to_string(),
                                found: label,
                            })
                        })
                        .collect::<FragResult<Vec<_>>>()?,
                ),
                (_, value) => value,
            };
            (registry.select_for_value(&value).clone(), value)
        }
    };

    let thread_safe = registry.is_thread_safe(&value);
    if !thread_safe && !guard::in_single_threaded_scope() {
        return Err(FragError::NonThreadSafeViolation {
            placeholder: name.to_string(),
            type_name: unsafe_type_name(registry, &value),
        });
    }

    let mut params = Vec::new();
    bound_type
        .write(registry, &mut params, &value)
        .map_err(|e| match e {
            FragError::NestedExpansion { .. } => FragError::NestedExpansion {
                placeholder: name.to_string(),
            },
            other => other,
        })?;

    let render_expression = if params.is_empty() {
        "NULL".to_string()
    } else {
        vec!["?"; params.len()].join(", ")
    };

    Ok(Placeholder {
        name: name.to_string(),
        confidential,
        render_expression,
        original_text: original.to_string(),
        bound_type,
        value,
        hint,
        params,
        thread_safe,
    })
}

fn unsafe_type_name(registry: &TypeRegistry, value: &Value) -> String {
    match value {
        Value::List(items) => items
            .iter()
            .find(|v| !registry.is_thread_safe(v))
            .map(|v| unsafe_type_name(registry, v))
            .unwrap_or_default(),
        other => registry.select_for_value(other).name().to_string(),
    }
}
