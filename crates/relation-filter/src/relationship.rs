//! Join relationship discovery.
//!
//! Two relations are related when their schemas share at least one column name. Exactly one join
//! column is recorded per unordered pair: the lexicographically smallest shared name. Any further
//! shared columns are kept on the [`Relationship`] as discarded candidates and reported through
//! [`RelationshipIndex::ambiguities`].
use crate::model::RelationStore;
use std::collections::{BTreeMap, BTreeSet};

/// An unordered pair of relations joined on a single column.
///
/// `left` always sorts before `right`, so two relationships over the same pair compare equal no
/// matter which side was discovered first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Relationship {
    left: String,
    right: String,
    column: String,
    discarded: Vec<String>,
}

impl Relationship {
    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }

    /// The join key shared by both relations.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Shared columns that lost the tie-break, in ascending order.
    pub fn discarded_columns(&self) -> &[String] {
        &self.discarded
    }

    pub fn is_ambiguous(&self) -> bool {
        !self.discarded.is_empty()
    }

    pub fn touches(&self, relation: &str) -> bool {
        self.left == relation || self.right == relation
    }

    /// The opposite end of the relationship from `relation`.
    pub fn other(&self, relation: &str) -> Option<&str> {
        if self.left == relation {
            Some(&self.right)
        } else if self.right == relation {
            Some(&self.left)
        } else {
            None
        }
    }
}

/// A relation pair sharing more than one column name.
///
/// Discovery still succeeds (the smallest column wins); this is surfaced so callers can see which
/// join was chosen for them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaAmbiguity {
    pub left: String,
    pub right: String,
    pub chosen: String,
    pub candidates: Vec<String>,
}

/// Symmetric `(relation, relation) -> join column` mapping over a [`RelationStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationshipIndex {
    relationships: Vec<Relationship>,
    by_pair: BTreeMap<(String, String), usize>,
    by_relation: BTreeMap<String, Vec<usize>>,
}

impl RelationshipIndex {
    /// Discover relationships by intersecting the column name sets of every relation pair.
    ///
    /// The result only depends on the schemas: neither column order nor relation insertion order
    /// affects which column is chosen.
    pub fn discover(store: &RelationStore) -> Self {
        let schemas: Vec<(&str, BTreeSet<&str>)> = store
            .iter()
            .map(|relation| {
                (
                    relation.name(),
                    relation.columns().iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let mut index = Self::default();
        for (i, (left, left_columns)) in schemas.iter().enumerate() {
            for (right, right_columns) in &schemas[i + 1..] {
                let mut shared = left_columns.intersection(right_columns);
                let Some(column) = shared.next() else {
                    continue;
                };
                let discarded: Vec<String> = shared.map(|c| c.to_string()).collect();
                if !discarded.is_empty() {
                    log::warn!(
                        "relations {left} and {right} share {} columns; joining on {column}, ignoring {discarded:?}",
                        discarded.len() + 1
                    );
                }
                index.push(Relationship {
                    left: left.to_string(),
                    right: right.to_string(),
                    column: column.to_string(),
                    discarded,
                });
            }
        }

        for (name, _) in &schemas {
            if !index.by_relation.contains_key(*name) {
                log::debug!("relation {name} shares no columns with any other relation");
            }
        }

        index
    }

    fn push(&mut self, relationship: Relationship) {
        let idx = self.relationships.len();
        self.by_pair.insert(
            (relationship.left.clone(), relationship.right.clone()),
            idx,
        );
        self.by_relation
            .entry(relationship.left.clone())
            .or_default()
            .push(idx);
        self.by_relation
            .entry(relationship.right.clone())
            .or_default()
            .push(idx);
        self.relationships.push(relationship);
    }

    pub fn relationship(&self, a: &str, b: &str) -> Option<&Relationship> {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.by_pair.get(&key).map(|&idx| &self.relationships[idx])
    }

    pub fn join_column(&self, a: &str, b: &str) -> Option<&str> {
        self.relationship(a, b).map(Relationship::column)
    }

    /// `(neighbor, join column)` for every relationship touching `relation`, ordered by neighbor.
    pub fn neighbors<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.by_relation
            .get(relation)
            .into_iter()
            .flatten()
            .filter_map(move |&idx| {
                let rel = &self.relationships[idx];
                rel.other(relation).map(|other| (other, rel.column()))
            })
    }

    /// All relationships, sorted by `(left, right)`.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn ambiguities(&self) -> Vec<SchemaAmbiguity> {
        self.relationships
            .iter()
            .filter(|rel| rel.is_ambiguous())
            .map(|rel| SchemaAmbiguity {
                left: rel.left.clone(),
                right: rel.right.clone(),
                chosen: rel.column.clone(),
                candidates: std::iter::once(rel.column.clone())
                    .chain(rel.discarded.iter().cloned())
                    .collect(),
            })
            .collect()
    }

    pub fn is_isolated(&self, relation: &str) -> bool {
        !self.by_relation.contains_key(relation)
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}
