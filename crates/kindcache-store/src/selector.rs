//! Field and label selectors
//!
//! Grammar follows the Kubernetes selector syntax:
//!
//! - Field selectors: `field=value`, `field==value`, `field!=value`, joined
//!   by commas. `\` escapes `,`, `=` and `\` inside terms.
//! - Label selectors: `key=value`, `key==value`, `key!=value`,
//!   `key in (a,b)`, `key notin (a,b)`, `key`, `!key`, `key>n`, `key<n`.
//!
//! The cache only answers field selectors made of equality requirements;
//! label selectors are evaluated in full.

use kindcache_common::{Error, Labels, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Selector operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    DoubleEquals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    GreaterThan,
    LessThan,
}

impl Operator {
    /// Whether the operator is an exact match (`=` or `==`)
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Equals | Self::DoubleEquals)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "=",
            Self::DoubleEquals => "==",
            Self::NotEquals => "!=",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::Exists => "exists",
            Self::DoesNotExist => "!",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
        };
        f.write_str(s)
    }
}

// ---- Field selectors ----

/// A single `field <op> value` constraint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl FieldRequirement {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// An exact-match requirement
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Equals, value)
    }
}

impl fmt::Display for FieldRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            escape_field(&self.field),
            self.operator,
            escape_field(&self.value)
        )
    }
}

/// Conjunction of field requirements
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    /// A selector with no requirements
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// A selector with a single `field=value` requirement
    pub fn one_term_equal(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::from_requirements([FieldRequirement::equals(field, value)])
    }

    pub fn from_requirements(requirements: impl IntoIterator<Item = FieldRequirement>) -> Self {
        Self {
            requirements: requirements.into_iter().collect(),
        }
    }

    /// Add a requirement
    #[must_use]
    pub fn and(mut self, requirement: FieldRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Fail with [`Error::UnsupportedSelector`] unless the selector has at
    /// least one requirement and every requirement is an exact match.
    pub fn validate_exact(&self) -> Result<()> {
        if self.requirements.is_empty() {
            return Err(Error::unsupported_selector(
                "field selector has no requirements to match exactly",
            ));
        }
        match self.requirements.iter().find(|r| !r.operator.is_equality()) {
            Some(req) => Err(Error::unsupported_selector(format!(
                "non-exact field matches are not supported by the cache: {req}"
            ))),
            None => Ok(()),
        }
    }

    /// Parse a field selector string
    pub fn parse(input: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for term in split_unescaped(input, ',') {
            if term.trim().is_empty() {
                continue;
            }
            requirements.push(parse_field_term(&term)?);
        }
        Ok(Self { requirements })
    }
}

impl FromStr for FieldSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, &self.requirements)
    }
}

fn parse_field_term(term: &str) -> Result<FieldRequirement> {
    let chars: Vec<(usize, char)> = term.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, n)| n);
        let found = match (c, next) {
            ('\\', _) => {
                i += 2;
                continue;
            }
            ('!', Some('=')) => Some((Operator::NotEquals, 2)),
            ('=', Some('=')) => Some((Operator::DoubleEquals, 2)),
            ('=', _) => Some((Operator::Equals, 1)),
            _ => None,
        };
        if let Some((operator, width)) = found {
            let field = unescape_field(term[..pos].trim());
            let value = unescape_field(term[pos + width..].trim());
            if field.is_empty() {
                return Err(Error::invalid_selector(format!(
                    "field selector term has no field: {term}"
                )));
            }
            return Ok(FieldRequirement::new(field, operator, value));
        }
        i += 1;
    }
    Err(Error::invalid_selector(format!(
        "invalid field selector term: {term}"
    )))
}

/// Split on `sep` where it is not preceded by an escaping backslash.
/// Escapes are kept in the output.
fn split_unescaped(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(n) = chars.next() {
                out.push(n);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ---- Label selectors ----

/// A single label constraint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelRequirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl LabelRequirement {
    /// Create a requirement, checking the number of values the operator takes
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        validate_label_key(&key)?;
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if !matches!(operator, Operator::GreaterThan | Operator::LessThan) {
            for value in &values {
                validate_label_value(value)?;
            }
        }

        match operator {
            Operator::Equals | Operator::DoubleEquals | Operator::NotEquals => {
                if values.len() != 1 {
                    return Err(Error::invalid_selector(format!(
                        "operator {operator} on label {key} takes exactly one value"
                    )));
                }
            }
            Operator::In | Operator::NotIn => {
                if values.is_empty() {
                    return Err(Error::invalid_selector(format!(
                        "operator {operator} on label {key} needs at least one value"
                    )));
                }
            }
            Operator::Exists | Operator::DoesNotExist => {
                if !values.is_empty() {
                    return Err(Error::invalid_selector(format!(
                        "operator {operator} on label {key} takes no values"
                    )));
                }
            }
            Operator::GreaterThan | Operator::LessThan => {
                let parsed = values.iter().next().map(|v| v.parse::<i64>());
                if values.len() != 1 || !matches!(parsed, Some(Ok(_))) {
                    return Err(Error::invalid_selector(format!(
                        "operator {operator} on label {key} takes one integer value"
                    )));
                }
            }
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// Evaluate the requirement against a label set
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::DoubleEquals | Operator::In => {
                value.is_some_and(|v| self.values.contains(v))
            }
            Operator::NotEquals | Operator::NotIn => {
                value.is_none_or(|v| !self.values.contains(v))
            }
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::GreaterThan | Operator::LessThan => {
                let Some(actual) = value.and_then(|v| v.parse::<i64>().ok()) else {
                    return false;
                };
                let Some(bound) = self.values.iter().next().and_then(|v| v.parse::<i64>().ok())
                else {
                    return false;
                };
                if self.operator == Operator::GreaterThan {
                    actual > bound
                } else {
                    actual < bound
                }
            }
        }
    }
}

impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::In | Operator::NotIn => {
                let values: Vec<&str> = self.values.iter().map(String::as_str).collect();
                write!(f, "{} {} ({})", self.key, self.operator, values.join(","))
            }
            _ => {
                let value = self.values.iter().next().map_or("", String::as_str);
                write!(f, "{}{}{}", self.key, self.operator, value)
            }
        }
    }
}

/// Conjunction of label requirements. An empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    /// A selector that matches every label set
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// A selector requiring every given label to be present with its value
    pub fn from_labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut selector = Self::default();
        for (key, value) in labels {
            selector
                .requirements
                .push(LabelRequirement::new(key, Operator::Equals, [value])?);
        }
        Ok(selector)
    }

    /// Add a requirement
    #[must_use]
    pub fn and(mut self, requirement: LabelRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn requirements(&self) -> &[LabelRequirement] {
        &self.requirements
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether every requirement matches the label set
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Parse a label selector string
    pub fn parse(input: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for term in split_outside_parens(input) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            requirements.push(parse_label_term(term)?);
        }
        Ok(Self { requirements })
    }
}

impl FromStr for LabelSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, &self.requirements)
    }
}

fn parse_label_term(term: &str) -> Result<LabelRequirement> {
    if let Some(key) = term.strip_prefix('!') {
        return LabelRequirement::new(key.trim(), Operator::DoesNotExist, Vec::<String>::new());
    }

    if let Some(open) = term.find('(') {
        if !term.ends_with(')') {
            return Err(Error::invalid_selector(format!(
                "unterminated value set in label selector term: {term}"
            )));
        }
        let head: Vec<&str> = term[..open].split_whitespace().collect();
        let operator = match head.as_slice() {
            [_, "in"] => Operator::In,
            [_, "notin"] => Operator::NotIn,
            _ => {
                return Err(Error::invalid_selector(format!(
                    "expected `key in (...)` or `key notin (...)`: {term}"
                )));
            }
        };
        let values = term[open + 1..term.len() - 1]
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty());
        return LabelRequirement::new(head[0], operator, values);
    }

    const OPERATORS: [(&str, Operator); 5] = [
        ("!=", Operator::NotEquals),
        ("==", Operator::DoubleEquals),
        ("=", Operator::Equals),
        (">", Operator::GreaterThan),
        ("<", Operator::LessThan),
    ];
    for (token, operator) in OPERATORS {
        if let Some((key, value)) = term.split_once(token) {
            return LabelRequirement::new(key.trim(), operator, [value.trim()]);
        }
    }

    LabelRequirement::new(term, Operator::Exists, Vec::<String>::new())
}

fn validate_label_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/'));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_selector(format!("invalid label key: {key:?}")))
    }
}

/// Values are empty, or at most 63 characters of `[A-Za-z0-9_.-]` starting
/// and ending with an alphanumeric.
fn validate_label_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    let bytes = value.as_bytes();
    let valid = bytes.len() <= 63
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_selector(format!("invalid label value: {value:?}")))
    }
}

fn split_outside_parens(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
