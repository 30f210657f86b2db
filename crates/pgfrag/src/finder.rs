//! Placeholder tokenizer.
//!
//! Splits template text into literal spans and named placeholders of the form
//! `:name`, `:name/*TYPE*/` or `:name/*TYPE<ARG>*/`.
//!
//! A match is ignored (kept as literal text) when:
//! - it is preceded by another `:` (a Postgres cast such as `col::int`), or
//! - the name is a reserved word, since placeholder names double as field names
//!   in generated parameter types.

use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r":([A-Za-z_][A-Za-z0-9_]*)(?:/\*([A-Za-z_][A-Za-z0-9_]*)(?:<([A-Za-z_][A-Za-z0-9_]*)>)?\*/)?",
    )
    .expect("placeholder pattern is valid")
});

const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try",
];

/// Whether `name` can be used as a placeholder name.
pub fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !RESERVED.contains(&name)
}

/// One named placeholder found in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderMatch<'a> {
    pub name: &'a str,
    pub type_hint: Option<&'a str>,
    pub argument_hint: Option<&'a str>,
    /// The full matched text, including any type hint comment.
    pub original: &'a str,
}

/// A piece of tokenized template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Placeholder(PlaceholderMatch<'a>),
}

/// Tokenizer over a borrowed template.
///
/// Cheap to copy; every call to [`iter`](Self::iter) restarts from the beginning.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderFinder<'a> {
    template: &'a str,
}

impl<'a> PlaceholderFinder<'a> {
    pub fn new(template: &'a str) -> Self {
        Self { template }
    }

    pub fn iter(&self) -> Tokens<'a> {
        Tokens {
            template: self.template,
            pos: 0,
            pending: None,
        }
    }

    /// Placeholders only, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = PlaceholderMatch<'a>> + 'a {
        self.iter().filter_map(|t| match t {
            Token::Placeholder(p) => Some(p),
            Token::Text(_) => None,
        })
    }

    /// Distinct placeholder names, in order of first appearance.
    pub fn names(&self) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = Vec::new();
        for p in self.placeholders() {
            if !names.contains(&p.name) {
                names.push(p.name);
            }
        }
        names
    }
}

impl<'a> IntoIterator for PlaceholderFinder<'a> {
    type Item = Token<'a>;
    type IntoIter = Tokens<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`PlaceholderFinder::iter`].
///
/// Yields no empty `Text` tokens.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    template: &'a str,
    pos: usize,
    pending: Option<PlaceholderMatch<'a>>,
}

impl<'a> Tokens<'a> {
    /// Unconsumed text after the current position.
    pub fn remainder(&self) -> &'a str {
        &self.template[self.pos..]
    }

    fn next_placeholder(&self) -> Option<(usize, usize, PlaceholderMatch<'a>)> {
        let template = self.template;
        let mut search = self.pos;
        while let Some(caps) = PLACEHOLDER.captures_at(template, search) {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            let after_colon = whole.start() > 0 && template.as_bytes()[whole.start() - 1] == b':';
            if after_colon || !is_placeholder_name(name) {
                // Resume right after the colon so `::a:b` style text is still scanned.
                search = whole.start() + 1;
                continue;
            }
            let found = PlaceholderMatch {
                name,
                type_hint: caps.get(2).map(|m| m.as_str()),
                argument_hint: caps.get(3).map(|m| m.as_str()),
                original: whole.as_str(),
            };
            return Some((whole.start(), whole.end(), found));
        }
        None
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(p) = self.pending.take() {
            return Some(Token::Placeholder(p));
        }
        if self.pos >= self.template.len() {
            return None;
        }
        match self.next_placeholder() {
            Some((start, end, found)) => {
                let gap = &self.template[self.pos..start];
                self.pos = end;
                if gap.is_empty() {
                    Some(Token::Placeholder(found))
                } else {
                    self.pending = Some(found);
                    Some(Token::Text(gap))
                }
            }
            None => {
                let rest = &self.template[self.pos..];
                self.pos = self.template.len();
                Some(Token::Text(rest))
            }
        }
    }
}
