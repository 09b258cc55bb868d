//! Filter engine façade.
//!
//! A filter call never touches the engine's relations: they are cloned into a working
//! [`RelationStore`], the configured [`FilterStrategy`] narrows that working set, and the
//! [`ConsistencyEnforcer`] then makes every discovered relationship agree on its key values. Any
//! error aborts the call; there are no partial results.
//!
//! Two strategies are available and may return different results for the same input:
//! - [`PropagationFilter`] follows the relationships inferred from shared column names,
//! - [`EntityGraph`] follows only the links declared in an [`EntitySchema`].
use crate::consistency::{ConsistencyEnforcer, ConsistencyMode};
use crate::graph::{EntityGraph, EntitySchema, ExpansionMode};
use crate::model::{Relation, RelationStore};
use crate::predicate::FilterSet;
use crate::propagation::PropagationFilter;
use crate::relationship::RelationshipIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    #[error("unknown column {relation}[{column}]")]
    UnknownColumn { relation: String, column: String },

    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    #[error("invalid entity schema: {0}")]
    EntitySchema(String),

    #[error("invalid date {value}: expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("duplicate relation: {relation}")]
    DuplicateRelation { relation: String },

    #[error("schema mismatch for {relation}: expected {expected} values, got {actual}")]
    SchemaMismatch {
        relation: String,
        expected: usize,
        actual: usize,
    },
}

/// Coarse classification of a [`FilterError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request or options reference something unknown or are shaped wrongly.
    Configuration,
    /// A value could not be parsed.
    Format,
    /// The relations themselves are malformed.
    Schema,
}

impl FilterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FilterError::UnknownRelation(_)
            | FilterError::UnknownColumn { .. }
            | FilterError::UnsupportedPredicate(_)
            | FilterError::EntitySchema(_) => ErrorKind::Configuration,
            FilterError::InvalidDate { .. } => ErrorKind::Format,
            FilterError::DuplicateRelation { .. } | FilterError::SchemaMismatch { .. } => {
                ErrorKind::Schema
            }
        }
    }
}

/// A way of narrowing the working relations before consistency enforcement.
pub trait FilterStrategy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Narrow `working` in place. Returns a strategy-specific work count (queue items processed,
    /// nodes reached).
    fn apply(
        &self,
        working: &mut RelationStore,
        index: &RelationshipIndex,
        predicates: &FilterSet,
    ) -> FilterResult<usize>;
}

/// Which strategy the engine runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StrategyConfig {
    #[default]
    Propagation,
    #[serde(rename_all = "camelCase")]
    EntityGraph {
        schema: EntitySchema,
        #[serde(default)]
        expansion: ExpansionMode,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub consistency: ConsistencyMode,
}

impl EngineOptions {
    pub fn propagation() -> Self {
        Self::default()
    }

    pub fn entity_graph(schema: EntitySchema, expansion: ExpansionMode) -> Self {
        Self {
            strategy: StrategyConfig::EntityGraph { schema, expansion },
            consistency: ConsistencyMode::default(),
        }
    }

    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    /// Check the options against the relations they will run on.
    pub fn validate(&self, store: &RelationStore) -> FilterResult<()> {
        match &self.strategy {
            StrategyConfig::Propagation => Ok(()),
            StrategyConfig::EntityGraph { schema, expansion } => {
                schema.validate(store)?;
                if let ExpansionMode::Guided { hops } = expansion {
                    for hop in hops {
                        for relation in [&hop.from, &hop.to] {
                            if !store.contains(relation) {
                                return Err(FilterError::UnknownRelation(relation.clone()));
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Everything a filter call produced, including how much work it took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterOutcome {
    pub relations: BTreeMap<String, Relation>,
    /// Relation name -> (rows before, rows after).
    pub row_counts: BTreeMap<String, (usize, usize)>,
    pub strategy: &'static str,
    pub strategy_work: usize,
    pub consistency_passes: usize,
}

#[derive(Debug)]
pub struct FilterEngine {
    store: RelationStore,
    index: RelationshipIndex,
    options: EngineOptions,
    strategy: Box<dyn FilterStrategy>,
}

impl FilterEngine {
    /// Build a propagation engine over `relations`.
    pub fn build(relations: impl IntoIterator<Item = Relation>) -> FilterResult<Self> {
        Self::with_options(relations, EngineOptions::default())
    }

    pub fn with_options(
        relations: impl IntoIterator<Item = Relation>,
        options: EngineOptions,
    ) -> FilterResult<Self> {
        let store = RelationStore::from_relations(relations)?;
        let (index, strategy) = prepare(&store, &options)?;
        Ok(Self {
            store,
            index,
            options,
            strategy,
        })
    }

    /// Admit (or replace) a relation and rediscover relationships.
    ///
    /// On error the engine is left exactly as it was.
    pub fn add_relation(&mut self, relation: Relation) -> FilterResult<()> {
        let mut store = self.store.clone();
        if store.replace_relation(relation).is_some() {
            log::debug!("replaced an existing relation; rediscovering relationships");
        }
        let (index, strategy) = prepare(&store, &self.options)?;
        self.store = store;
        self.index = index;
        self.strategy = strategy;
        Ok(())
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.store.relation(name)
    }

    pub fn relations(&self) -> &RelationStore {
        &self.store
    }

    pub fn relationships(&self) -> &RelationshipIndex {
        &self.index
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Filter every relation. The result holds every relation the engine knows, including ones no
    /// predicate targeted.
    pub fn filter(&self, predicates: &FilterSet) -> FilterResult<BTreeMap<String, Relation>> {
        self.filter_outcome(predicates).map(|outcome| outcome.relations)
    }

    pub fn filter_outcome(&self, predicates: &FilterSet) -> FilterResult<FilterOutcome> {
        for relation in predicates.relations() {
            if !self.store.contains(relation) {
                return Err(FilterError::UnknownRelation(relation.to_string()));
            }
        }

        let mut working = self.store.clone();
        let strategy_work = self.strategy.apply(&mut working, &self.index, predicates)?;
        let consistency_passes =
            ConsistencyEnforcer::new(self.options.consistency).enforce(&mut working, &self.index)?;

        let before = self.store.row_counts();
        let after = working.row_counts();
        let row_counts = before
            .into_iter()
            .map(|(name, rows)| {
                let kept = after.get(&name).copied().unwrap_or(0);
                (name, (rows, kept))
            })
            .collect();

        Ok(FilterOutcome {
            relations: working.into_relations(),
            row_counts,
            strategy: self.strategy.name(),
            strategy_work,
            consistency_passes,
        })
    }
}

fn prepare(
    store: &RelationStore,
    options: &EngineOptions,
) -> FilterResult<(RelationshipIndex, Box<dyn FilterStrategy>)> {
    options.validate(store)?;
    let index = RelationshipIndex::discover(store);
    let strategy: Box<dyn FilterStrategy> = match &options.strategy {
        StrategyConfig::Propagation => Box::new(PropagationFilter::new()),
        StrategyConfig::EntityGraph { schema, expansion } => {
            Box::new(EntityGraph::build(store, schema, expansion.clone())?)
        }
    };
    log::debug!(
        "prepared {} strategy over {} relation(s), {} relationship(s)",
        strategy.name(),
        store.len(),
        index.len()
    );
    Ok((index, strategy))
}
