//! Pairwise key agreement across every discovered relationship.
//!
//! One pass walks the relationships in `(left, right)` order and trims both ends of each to the
//! intersection of their key sets. A single pass can leave residue: trimming `B` for the `(B, C)`
//! relationship may remove keys `B` shares with an earlier `(A, B)` relationship. The default mode
//! therefore repeats passes until a full pass removes nothing.
//!
//! Rows whose join key is null never survive a pass: null is not a key value.
use crate::engine::{FilterError, FilterResult};
use crate::model::RelationStore;
use crate::relationship::{Relationship, RelationshipIndex};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsistencyMode {
    /// Repeat passes until no relation changes.
    #[default]
    Fixpoint,
    /// Exactly one pass over the relationships.
    SinglePass,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsistencyEnforcer {
    mode: ConsistencyMode,
}

impl ConsistencyEnforcer {
    pub fn new(mode: ConsistencyMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ConsistencyMode {
        self.mode
    }

    /// Enforce key agreement in place. Returns the number of passes run.
    pub fn enforce(&self, store: &mut RelationStore, index: &RelationshipIndex) -> FilterResult<usize> {
        let mut passes = 0;
        loop {
            passes += 1;
            let changed = enforce_pass(store, index)?;
            if !changed || self.mode == ConsistencyMode::SinglePass {
                break;
            }
        }
        log::debug!(
            "consistency enforcement ({:?}) finished after {passes} pass(es)",
            self.mode
        );
        Ok(passes)
    }
}

fn enforce_pass(store: &mut RelationStore, index: &RelationshipIndex) -> FilterResult<bool> {
    let mut changed = false;
    for relationship in index.relationships() {
        let column = relationship.column();
        let left_keys = keys(store, relationship.left(), column)?;
        let right_keys = keys(store, relationship.right(), column)?;
        let common: BTreeSet<_> = left_keys.intersection(&right_keys).cloned().collect();
        for name in [relationship.left(), relationship.right()] {
            let relation = store
                .relation_mut(name)
                .ok_or_else(|| FilterError::UnknownRelation(name.to_string()))?;
            let removed = relation.retain_keys(column, &common);
            if removed > 0 {
                log::trace!("consistency on {column}: removed {removed} row(s) from {name}");
                changed = true;
            }
        }
    }
    Ok(changed)
}

fn keys(store: &RelationStore, relation: &str, column: &str) -> FilterResult<BTreeSet<Value>> {
    store
        .relation(relation)
        .map(|r| r.key_values(column))
        .ok_or_else(|| FilterError::UnknownRelation(relation.to_string()))
}

/// Relationships whose two ends disagree on their key sets.
pub fn violations<'a>(store: &RelationStore, index: &'a RelationshipIndex) -> Vec<&'a Relationship> {
    index
        .relationships()
        .iter()
        .filter(|rel| {
            let column = rel.column();
            let left = store.relation(rel.left()).map(|r| r.key_values(column));
            let right = store.relation(rel.right()).map(|r| r.key_values(column));
            left != right
        })
        .collect()
}
