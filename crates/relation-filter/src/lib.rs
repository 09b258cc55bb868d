mod consistency;
mod engine;
mod graph;
mod model;
mod predicate;
mod propagation;
mod relationship;
mod value;

pub use crate::engine::{
    EngineOptions, ErrorKind, FilterEngine, FilterError, FilterOutcome, FilterResult,
    FilterStrategy, StrategyConfig,
};
pub use crate::model::{Relation, RelationStore};
pub use crate::value::Value;

pub use crate::consistency::{violations, ConsistencyEnforcer, ConsistencyMode};
pub use crate::graph::{
    CompareOp, Condition, EntityGraph, EntityLink, EntityNode, EntitySchema, ExpansionMode, Hop,
};
pub use crate::predicate::{evaluate, ColumnPredicate, FilterSet, Predicate};
pub use crate::propagation::PropagationFilter;
pub use crate::relationship::{Relationship, RelationshipIndex, SchemaAmbiguity};
