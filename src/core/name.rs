//! core::name
//!
//! Hierarchical names for tree entries.
//!
//! # Format
//!
//! A [`Name`] is an ordered sequence of [`NameToken`]s. Each token is an
//! identifier with an optional index that disambiguates same-name siblings.
//! The textual form joins tokens with `.` and writes the index in brackets:
//!
//! ```text
//! a.b[2].c
//! ```
//!
//! Tokens whose body starts with `@` are reserved. Trees never enumerate
//! reserved entries; they carry node-level attributes instead of values.
//!
//! # Examples
//!
//! ```
//! use goaltree::core::name::Name;
//!
//! let name = Name::parse("a.b[2].c").unwrap();
//! assert_eq!(name.len(), 3);
//! assert_eq!(name.to_string(), "a.b[2].c");
//! assert_eq!(name.tokens()[1].index(), Some("2"));
//!
//! let prefix = Name::parse("a").unwrap();
//! assert_eq!(name.strip_prefix(&prefix).unwrap().to_string(), "b[2].c");
//!
//! assert!(Name::parse("a..b").is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of the reserved token carrying node attributes.
pub const META_TOKEN: &str = "@meta";

/// Prefix marking a reserved token.
pub const RESERVED_PREFIX: char = '@';

/// Errors from name parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("name token cannot be empty in '{0}'")]
    EmptyToken(String),

    #[error("unbalanced index brackets in '{0}'")]
    Unbalanced(String),

    #[error("invalid name token '{0}': {1}")]
    InvalidToken(String, &'static str),
}

/// A single segment of a [`Name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameToken {
    body: String,
    index: Option<String>,
}

impl NameToken {
    /// Create a token without an index.
    ///
    /// # Errors
    ///
    /// Returns `NameError::InvalidToken` if the body is empty or contains
    /// one of `.`, `[`, `]`.
    pub fn new(body: impl Into<String>) -> Result<Self, NameError> {
        let body = body.into();
        Self::validate_body(&body)?;
        Ok(Self { body, index: None })
    }

    /// Create a token with a disambiguating index.
    pub fn indexed(body: impl Into<String>, index: impl Into<String>) -> Result<Self, NameError> {
        let body = body.into();
        let index = index.into();
        Self::validate_body(&body)?;
        if index.is_empty() {
            return Err(NameError::InvalidToken(index, "index cannot be empty"));
        }
        if index.contains(['[', ']']) {
            return Err(NameError::InvalidToken(index, "index cannot contain brackets"));
        }
        Ok(Self {
            body,
            index: Some(index),
        })
    }

    /// The reserved token used for node attributes.
    pub fn meta() -> Self {
        Self {
            body: META_TOKEN.to_string(),
            index: None,
        }
    }

    /// `@suffix`, for keys generated by the crate itself.
    pub(crate) fn reserved(suffix: &str) -> Self {
        Self {
            body: format!("{}{}", RESERVED_PREFIX, suffix),
            index: None,
        }
    }

    fn validate_body(body: &str) -> Result<(), NameError> {
        if body.is_empty() {
            return Err(NameError::InvalidToken(
                body.to_string(),
                "body cannot be empty",
            ));
        }
        if body.contains(['.', '[', ']']) {
            return Err(NameError::InvalidToken(
                body.to_string(),
                "body cannot contain '.', '[' or ']'",
            ));
        }
        Ok(())
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Returns true for tokens hidden from public enumeration.
    pub fn is_reserved(&self) -> bool {
        self.body.starts_with(RESERVED_PREFIX)
    }

    /// Same body with a different index.
    pub fn with_index(&self, index: impl Into<String>) -> Result<Self, NameError> {
        Self::indexed(self.body.clone(), index)
    }
}

impl fmt::Display for NameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.index {
            Some(index) => write!(f, "{}[{}]", self.body, index),
            None => write!(f, "{}", self.body),
        }
    }
}

impl FromStr for NameToken {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_token(s, s)
    }
}

/// A hierarchical path name.
///
/// The empty name addresses the root of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(Vec<NameToken>);

impl Name {
    /// The empty (root) name.
    pub const EMPTY: Name = Name(Vec::new());

    /// Parse a dotted textual name such as `a.b[2].c`.
    ///
    /// The empty string parses to [`Name::EMPTY`].
    ///
    /// # Errors
    ///
    /// Returns a `NameError` for empty segments, unbalanced brackets or
    /// invalid token bodies.
    pub fn parse(text: &str) -> Result<Self, NameError> {
        if text.is_empty() {
            return Ok(Self::EMPTY);
        }

        let mut tokens = Vec::new();
        let mut start = 0;
        let mut depth = 0usize;
        for (i, c) in text.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    if depth == 0 {
                        return Err(NameError::Unbalanced(text.to_string()));
                    }
                    depth -= 1;
                }
                '.' if depth == 0 => {
                    tokens.push(parse_token(&text[start..i], text)?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(NameError::Unbalanced(text.to_string()));
        }
        tokens.push(parse_token(&text[start..], text)?);
        Ok(Self(tokens))
    }

    pub fn from_tokens(tokens: impl IntoIterator<Item = NameToken>) -> Self {
        Self(tokens.into_iter().collect())
    }

    pub fn tokens(&self) -> &[NameToken] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&NameToken> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&NameToken> {
        self.0.last()
    }

    /// Everything after the first token.
    pub fn cut_first(&self) -> Name {
        Self(self.0.iter().skip(1).cloned().collect())
    }

    /// Everything before the last token.
    pub fn cut_last(&self) -> Name {
        let keep = self.0.len().saturating_sub(1);
        Self(self.0[..keep].to_vec())
    }

    /// Concatenate two names.
    pub fn plus(&self, other: &Name) -> Name {
        let mut tokens = self.0.clone();
        tokens.extend(other.0.iter().cloned());
        Self(tokens)
    }

    /// Append a single token.
    pub fn child(&self, token: NameToken) -> Name {
        let mut tokens = self.0.clone();
        tokens.push(token);
        Self(tokens)
    }

    /// Returns true if `prefix` is a (non-strict) prefix of this name.
    pub fn starts_with(&self, prefix: &Name) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Remove `prefix` from the front of this name.
    ///
    /// Returns `None` if this name does not start with `prefix`.
    pub fn strip_prefix(&self, prefix: &Name) -> Option<Name> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Self(rest.to_vec()))
    }

    /// Returns true if any token is reserved.
    pub fn is_reserved(&self) -> bool {
        self.0.iter().any(NameToken::is_reserved)
    }
}

fn parse_token(segment: &str, full: &str) -> Result<NameToken, NameError> {
    if segment.is_empty() {
        return Err(NameError::EmptyToken(full.to_string()));
    }
    match segment.find('[') {
        None => NameToken::new(segment),
        Some(open) => {
            let Some(inner) = segment[open + 1..].strip_suffix(']') else {
                return Err(NameError::Unbalanced(full.to_string()));
            };
            NameToken::indexed(&segment[..open], inner)
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Name {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.to_string()
    }
}

impl From<NameToken> for Name {
    fn from(token: NameToken) -> Self {
        Self(vec![token])
    }
}
