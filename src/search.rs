//! Search criteria and predicate evaluation.
//!
//! A [`SearchCriteria`] is a sparse predicate: any field left unset is a
//! wildcard. Set fields must all pass for a node to match. Patterns are
//! regular expressions matched against the entire field, not substrings.

use crate::error::StorageError;
use crate::node::Node;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Addressable fields of a criteria record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Field {
    Owner,
    Name,
    Path,
    Key,
    Value,
    Type,
    Visibility,
    LastModified,
}

impl Field {
    /// Canonical wire form of the field identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Owner => "OWNER",
            Field::Name => "NAME",
            Field::Path => "PATH",
            Field::Key => "KEY",
            Field::Value => "VALUE",
            Field::Type => "TYPE",
            Field::Visibility => "VISIBILITY",
            Field::LastModified => "LAST_MODIFIED",
        }
    }

    /// Parse the canonical form back into a field identifier.
    pub fn parse(s: &str) -> Option<Field> {
        match s {
            "OWNER" => Some(Field::Owner),
            "NAME" => Some(Field::Name),
            "PATH" => Some(Field::Path),
            "KEY" => Some(Field::Key),
            "VALUE" => Some(Field::Value),
            "TYPE" => Some(Field::Type),
            "VISIBILITY" => Some(Field::Visibility),
            "LAST_MODIFIED" => Some(Field::LastModified),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sparse, field-wise predicate for matching nodes and their values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    terms: BTreeMap<Field, String>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field pattern, returning the previous pattern if any.
    pub fn set(&mut self, field: Field, pattern: impl Into<String>) -> Option<String> {
        self.terms.insert(field, pattern.into())
    }

    /// The pattern currently set for `field`.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.terms.get(&field).map(String::as_str)
    }

    /// Remove a field pattern, turning the field back into a wildcard.
    pub fn unset(&mut self, field: Field) -> Option<String> {
        self.terms.remove(&field)
    }

    pub fn terms(&self) -> &BTreeMap<Field, String> {
        &self.terms
    }

    /// Rebuild a criteria record from decoded terms.
    pub(crate) fn from_terms(terms: BTreeMap<Field, String>) -> Self {
        SearchCriteria { terms }
    }

    /// Evaluate this criteria against a node.
    ///
    /// A node matches when every active dimension passes: the path-prefix
    /// subtree filter, the owner and visibility patterns, and the value
    /// dimension. With KEY unset but VALUE or TYPE set, any single value
    /// satisfying both patterns matches (existential); with KEY set, the
    /// value under that exact key must satisfy both.
    pub fn evaluate(&self, node: &Node) -> Result<bool, StorageError> {
        // The path filter is a subtree test, not a regex.
        if let Some(prefix) = self.get(Field::Path) {
            if !node.path().starts_with(prefix) {
                return Ok(false);
            }
        }

        if let Some(pattern) = self.get(Field::Owner) {
            if !match_full(pattern, node.owner())? {
                return Ok(false);
            }
        }
        if let Some(pattern) = self.get(Field::Visibility) {
            if !match_full(pattern, node.visibility().as_str())? {
                return Ok(false);
            }
        }

        let type_pattern = self.get(Field::Type);
        let value_pattern = self.get(Field::Value);
        match self.get(Field::Key) {
            None if type_pattern.is_some() || value_pattern.is_some() => {
                for value in node.values().values() {
                    if self.value_matches(value, type_pattern, value_pattern)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Some(key) => match node.value(key) {
                Some(value) => self.value_matches(value, type_pattern, value_pattern),
                None => Ok(false),
            },
            None => Ok(true),
        }
    }

    fn value_matches(
        &self,
        value: &crate::node::NodeValue,
        type_pattern: Option<&str>,
        value_pattern: Option<&str>,
    ) -> Result<bool, StorageError> {
        if let Some(pattern) = type_pattern {
            if !match_full(pattern, value.value_type())? {
                return Ok(false);
            }
        }
        if let Some(pattern) = value_pattern {
            if !match_full(pattern, value.value())? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Full-string regex match: the entire text must satisfy the pattern.
fn match_full(pattern: &str, text: &str) -> Result<bool, StorageError> {
    let re = Regex::new(&format!(r"\A(?:{})\z", pattern))?;
    Ok(re.is_match(text))
}
