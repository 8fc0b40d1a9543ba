//! Tag-class vocabularies for validating reloaded tables.
//!
//! A tagged table written by one run may be reloaded much later, possibly
//! after the annotation guidelines changed. A [`TagSchema`] pins the set of
//! permitted tag classes so a stale or foreign table is rejected instead of
//! silently flowing into document reconstruction.
//!
//! Membership is checked on the tag *class*, i.e. after the IOB2 prefix is
//! stripped: a schema containing `Color` accepts `B-Color` and `I-Color`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::Tag;

/// A named vocabulary of permitted tag classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSchema {
    /// Vocabulary name, e.g. a category-system identifier.
    pub name: String,
    /// Permitted class names.
    pub classes: Vec<String>,
}

impl TagSchema {
    /// Create a schema from a name and its classes.
    #[must_use]
    pub fn new(name: impl Into<String>, classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    /// True when `class` is a permitted tag class.
    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Check a tag against the vocabulary. `O` is always permitted.
    #[must_use]
    pub fn permits(&self, tag: &Tag) -> bool {
        match tag.class() {
            None => true,
            Some(class) => self.contains(class),
        }
    }

    /// Classes used by `tags` that the vocabulary does not declare, deduped,
    /// in first-seen order.
    #[must_use]
    pub fn undeclared<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for tag in tags {
            if let Some(class) = tag.class() {
                if !self.contains(class) && seen.insert(class.to_string()) {
                    missing.push(class.to_string());
                }
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space_schema() -> TagSchema {
        TagSchema::new(
            "space-analysis",
            ["Ort-Container", "Bewegung-Subjekt", "Dimensionierung-Menge"],
        )
    }

    #[test]
    fn test_membership_ignores_iob_prefix() {
        let schema = space_schema();
        assert!(schema.permits(&Tag::B("Ort-Container".to_string())));
        assert!(schema.permits(&Tag::I("Ort-Container".to_string())));
        assert!(!schema.permits(&Tag::B("Ort".to_string())));
    }

    #[test]
    fn test_outside_always_permitted() {
        assert!(space_schema().permits(&Tag::O));
        assert!(TagSchema::new("empty", Vec::<String>::new()).permits(&Tag::O));
    }

    #[test]
    fn test_undeclared_dedupes_in_order() {
        let schema = space_schema();
        let tags = vec![
            Tag::B("Farbe".to_string()),
            Tag::I("Farbe".to_string()),
            Tag::O,
            Tag::B("Klang".to_string()),
            Tag::B("Ort-Container".to_string()),
        ];
        assert_eq!(schema.undeclared(&tags), vec!["Farbe", "Klang"]);
    }
}
