//! Tag vectors as carried on an event: `["e", "<id>", "wss://relay"]`.

use serde::{Deserialize, Serialize};

/// A single tag: an ordered list of strings, key at index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn key(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    pub fn value(&self) -> &str {
        self.0.get(1).map(String::as_str).unwrap_or("")
    }

    /// True when this tag's key has exactly one character, the shape the
    /// store flattens into `tagvalues`.
    pub fn is_single_char(&self) -> bool {
        self.key().chars().count() == 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(pub Vec<Tag>);

impl Tags {
    pub fn find_first(&self, key: &str) -> Option<&Tag> {
        self.0.iter().find(|t| t.key() == key)
    }

    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Tag> {
        self.0.iter().filter(move |t| t.key() == key)
    }

    pub fn d_value(&self) -> Option<&str> {
        self.find_first("d").map(Tag::value)
    }

    /// The multiset of values the store persists as `tagvalues`, used for
    /// the GIN-indexed array-overlap filter match.
    pub fn tagvalues(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|t| t.is_single_char())
            .map(|t| t.value().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Vec<String>>> for Tags {
    fn from(v: Vec<Vec<String>>) -> Self {
        Tags(v.into_iter().map(Tag).collect())
    }
}
