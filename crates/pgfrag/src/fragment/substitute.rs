use super::{Element, SqlFragment};
use crate::error::{FragError, FragResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("keyword pattern is valid")
});

/// Keyword-to-fragment map for [`SqlFragment::substitute`].
///
/// Strict by default: a `${keyword}` with no mapping fails with
/// [`FragError::UnresolvedKeyword`]. [`lenient`](Self::lenient) keeps such markers as text.
/// A replacement built with `and`/`or` is spliced in parentheses, so
/// `x = 1 AND ${f}` with `f = a.or(b)` renders `x = 1 AND (a = ? OR b = ?)`.
///
/// # Example
///
/// ```ignore
/// let subs = Substitutions::new()
///     .with("filter", SqlFragment::new("status = :status", &bindings! { "status" => "active" })?);
/// let q = SqlFragment::text("SELECT * FROM users WHERE ${filter}").substitute(&subs)?;
/// assert_eq!(q.sql(), "SELECT * FROM users WHERE status = ?");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    fragments: HashMap<String, SqlFragment>,
    lenient: bool,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: impl Into<String>, fragment: SqlFragment) -> Self {
        self.insert(keyword, fragment);
        self
    }

    pub fn insert(&mut self, keyword: impl Into<String>, fragment: SqlFragment) -> &mut Self {
        self.fragments.insert(keyword.into(), fragment);
        self
    }

    /// Leave unmapped markers in place instead of failing.
    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    pub fn get(&self, keyword: &str) -> Option<&SqlFragment> {
        self.fragments.get(keyword)
    }
}

pub(super) fn apply(fragment: &SqlFragment, subs: &Substitutions) -> FragResult<SqlFragment> {
    let mut elements = Vec::with_capacity(fragment.elements.len());
    let mut confidential = fragment.confidential;
    // Markers may straddle element boundaries after `concat`, so scan merged text runs.
    let mut run = String::new();

    for element in &fragment.elements {
        match element {
            Element::Text(text) => run.push_str(text),
            Element::Placeholder(_) => {
                confidential |= splice(&mut elements, &run, subs)?;
                run.clear();
                elements.push(element.clone());
            }
        }
    }
    confidential |= splice(&mut elements, &run, subs)?;

    Ok(SqlFragment::from_parts(elements, fragment.kind, confidential))
}

/// Push `text` with its markers replaced. Returns whether a confidential fragment was spliced.
fn splice(elements: &mut Vec<Element>, text: &str, subs: &Substitutions) -> FragResult<bool> {
    let mut confidential = false;
    let mut last = 0;
    for caps in KEYWORD.captures_iter(text) {
        let (Some(whole), Some(keyword)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(replacement) = subs.get(keyword.as_str()) else {
            if subs.lenient {
                continue;
            }
            return Err(FragError::UnresolvedKeyword {
                keyword: keyword.as_str().to_string(),
            });
        };
        push_text(elements, &text[last..whole.start()]);
        let grouped = replacement.kind.is_boolean_join();
        if grouped {
            elements.push(Element::Text("(".to_string()));
        }
        elements.extend(replacement.elements.iter().cloned());
        if grouped {
            elements.push(Element::Text(")".to_string()));
        }
        confidential |= replacement.is_confidential();
        last = whole.end();
    }
    push_text(elements, &text[last..]);
    Ok(confidential)
}

fn push_text(elements: &mut Vec<Element>, text: &str) {
    if !text.is_empty() {
        elements.push(Element::Text(text.to_string()));
    }
}
