//! Tag sets used to address pairs, sub-structures and runtime components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered set of string tags.
///
/// Insertion order is preserved because builder resolution walks the tags in
/// the order they were added. Duplicates are dropped. Matching is by exact
/// membership only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits `text` on whitespace, one tag per word.
    ///
    /// `Tags::parse("rod front")` yields the two tags `"rod"` and `"front"`.
    pub fn parse(text: &str) -> Self {
        text.split_whitespace().collect()
    }

    /// Adds a tag unless it is already present.
    pub fn insert(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !tag.is_empty() && !self.contains(&tag) {
            self.0.push(tag);
        }
    }

    /// Adds every tag of `other` in order.
    pub fn extend_from(&mut self, other: &Tags) {
        for tag in other.iter() {
            self.insert(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for tag in iter {
            tags.insert(tag);
        }
        tags
    }
}

/// A single tag, taken verbatim.
///
/// `Tags::from("inner top")` is the one tag `"inner top"`; use
/// [`Tags::parse`] or an array such as `["inner", "top"]` to get two.
impl From<&str> for Tags {
    fn from(tag: &str) -> Self {
        std::iter::once(tag).collect()
    }
}

impl From<String> for Tags {
    fn from(tag: String) -> Self {
        std::iter::once(tag).collect()
    }
}

impl<const N: usize> From<[&str; N]> for Tags {
    fn from(tags: [&str; N]) -> Self {
        tags.into_iter().collect()
    }
}

impl From<&[&str]> for Tags {
    fn from(tags: &[&str]) -> Self {
        tags.iter().copied().collect()
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

/// Anything addressable by tag.
pub trait Tagged {
    fn tags(&self) -> &Tags;

    fn has_tag(&self, tag: &str) -> bool {
        self.tags().contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_kept_and_duplicates_dropped() {
        let tags: Tags = ["muscle", "rod", "muscle"].into();
        assert_eq!(tags.iter().collect::<Vec<_>>(), vec!["muscle", "rod"]);
    }

    #[test]
    fn parse_splits_on_whitespace() {
        let tags = Tags::parse("inner  top\tseg1");
        assert_eq!(tags.len(), 3);
        assert!(tags.contains("top"));
        assert!(!tags.contains("inner top"));
    }

    #[test]
    fn from_str_keeps_the_text_as_one_tag() {
        let tags = Tags::from("inner top");
        assert_eq!(tags.len(), 1);
        assert!(tags.contains("inner top"));
        assert_eq!(Tags::parse("inner top"), Tags::from(["inner", "top"]));
    }
}
