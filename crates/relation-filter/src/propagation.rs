//! Queue-driven propagation over inferred relationships.
//!
//! Each queue item is an immutable message: "apply these predicates to relation X". Applying an
//! item may shrink the key set X exposes on one of its relationships; every such edge yields a new
//! membership item for the neighbor on the far side. The working [`RelationStore`] is the only
//! mutable state.
//!
//! Row sets only ever shrink and are finite, so the queue drains. The order items are processed in
//! changes how much work is done, not the fixpoint reached.
use crate::engine::{FilterError, FilterResult, FilterStrategy};
use crate::model::RelationStore;
use crate::predicate::{apply_all, ColumnPredicate, FilterSet, Predicate};
use crate::relationship::RelationshipIndex;
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Origin {
    Caller,
    Propagated { from: String },
}

#[derive(Clone, Debug)]
struct WorkItem {
    relation: String,
    predicates: Vec<ColumnPredicate>,
    origin: Origin,
}

/// Pushes surviving join keys to neighbors until no relation changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropagationFilter;

impl PropagationFilter {
    pub fn new() -> Self {
        Self
    }

    /// Run the queue to completion against `working`. Returns the number of items processed.
    pub fn run(
        &self,
        working: &mut RelationStore,
        index: &RelationshipIndex,
        predicates: &FilterSet,
    ) -> FilterResult<usize> {
        let mut queue: VecDeque<WorkItem> = predicates
            .iter()
            .map(|(relation, predicates)| WorkItem {
                relation: relation.to_string(),
                predicates: predicates.to_vec(),
                origin: Origin::Caller,
            })
            .collect();

        let mut processed = 0;
        while let Some(item) = queue.pop_front() {
            processed += 1;
            let relation = working
                .relation_mut(&item.relation)
                .ok_or_else(|| FilterError::UnknownRelation(item.relation.clone()))?;

            let edges: Vec<_> = index
                .neighbors(&item.relation)
                .map(|(neighbor, column)| (neighbor, column, relation.key_values(column)))
                .collect();

            let removed = apply_all(relation, &item.predicates)?;
            for (predicate, count) in item.predicates.iter().zip(&removed) {
                if *count > 0 {
                    log::trace!(
                        "{}[{}] removed {count} row(s) ({:?})",
                        item.relation,
                        predicate.column,
                        item.origin
                    );
                }
            }
            if removed.iter().all(|count| *count == 0) {
                continue;
            }

            for (neighbor, column, before) in edges {
                let after = relation.key_values(column);
                // `after` is a subset of `before`, so equal sizes mean nothing changed.
                if after.len() == before.len() {
                    continue;
                }
                queue.push_back(WorkItem {
                    relation: neighbor.to_string(),
                    predicates: vec![ColumnPredicate::new(column, Predicate::Membership(after))],
                    origin: Origin::Propagated {
                        from: item.relation.clone(),
                    },
                });
            }
        }

        log::debug!("propagation processed {processed} queue item(s)");
        Ok(processed)
    }
}

impl FilterStrategy for PropagationFilter {
    fn name(&self) -> &'static str {
        "propagation"
    }

    fn apply(
        &self,
        working: &mut RelationStore,
        index: &RelationshipIndex,
        predicates: &FilterSet,
    ) -> FilterResult<usize> {
        self.run(working, index, predicates)
    }
}
