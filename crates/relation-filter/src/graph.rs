//! Entity-graph filtering.
//!
//! Every row of every relation becomes a node keyed `relation:id`, where `id` is the value of the
//! relation's declared identifier column. Edges come only from the links declared in an
//! [`EntitySchema`], never from inferred shared columns, so this topology is usually narrower than
//! the one [`RelationshipIndex`] discovers. The two strategies can therefore disagree on the same
//! input.
//!
//! Filtering is three steps:
//! 1. select the nodes whose attributes satisfy every condition,
//! 2. expand breadth-first from that selection (full closure, or only along allowed relation
//!    hops),
//! 3. regroup the expanded nodes into relations by tag.
//!
//! A condition on an attribute a node does not have simply does not match; it is not an error.
use crate::engine::{FilterError, FilterResult, FilterStrategy};
use crate::model::{Relation, RelationStore};
use crate::predicate::{FilterSet, Predicate};
use crate::relationship::RelationshipIndex;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Declared entity identifiers and foreign-key links.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    /// Relation name -> identifier column.
    #[serde(default)]
    pub id_columns: BTreeMap<String, String>,
    #[serde(default)]
    pub links: Vec<EntityLink>,
}

/// `from_relation[join_column]` references the identifier of `to_relation`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLink {
    pub from_relation: String,
    pub join_column: String,
    pub to_relation: String,
}

impl EntitySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, relation: impl Into<String>, column: impl Into<String>) -> Self {
        self.id_columns.insert(relation.into(), column.into());
        self
    }

    pub fn with_link(
        mut self,
        from_relation: impl Into<String>,
        join_column: impl Into<String>,
        to_relation: impl Into<String>,
    ) -> Self {
        self.links.push(EntityLink {
            from_relation: from_relation.into(),
            join_column: join_column.into(),
            to_relation: to_relation.into(),
        });
        self
    }

    /// Check every reference against the relations in `store`.
    pub fn validate(&self, store: &RelationStore) -> FilterResult<()> {
        for (relation, column) in &self.id_columns {
            require_column(store, relation, column)?;
        }
        for link in &self.links {
            require_column(store, &link.from_relation, &link.join_column)?;
            if !store.contains(&link.to_relation) {
                return Err(FilterError::UnknownRelation(link.to_relation.clone()));
            }
            if link.from_relation == link.to_relation {
                return Err(FilterError::EntitySchema(format!(
                    "link {}[{}] points back at its own relation",
                    link.from_relation, link.join_column
                )));
            }
            if !self.id_columns.contains_key(&link.to_relation) {
                return Err(FilterError::EntitySchema(format!(
                    "link target {} has no identifier column",
                    link.to_relation
                )));
            }
        }
        Ok(())
    }
}

fn require_column(store: &RelationStore, relation: &str, column: &str) -> FilterResult<()> {
    let rel = store
        .relation(relation)
        .ok_or_else(|| FilterError::UnknownRelation(relation.to_string()))?;
    if !rel.has_column(column) {
        return Err(FilterError::UnknownColumn {
            relation: relation.to_string(),
            column: column.to_string(),
        });
    }
    Ok(())
}

/// A directed relation-to-relation step allowed during guided expansion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
}

impl Hop {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// How the selected nodes are grown before materialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ExpansionMode {
    /// Everything reachable from the selection by any path.
    #[default]
    Closure,
    /// Only cross edges whose `(from relation, to relation)` is listed.
    Guided { hops: Vec<Hop> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Ne,
}

impl CompareOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(CompareOp::Gt),
            "gte" => Some(CompareOp::Gte),
            "lt" => Some(CompareOp::Lt),
            "lte" => Some(CompareOp::Lte),
            "ne" => Some(CompareOp::Ne),
            _ => None,
        }
    }
}

/// A per-attribute node condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Equals(Value),
    In(BTreeSet<Value>),
    Compare(CompareOp, Value),
    Satisfies(Predicate),
}

impl Condition {
    pub fn one_of(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Condition::In(
            values
                .into_iter()
                .filter_map(|v| v.into().join_key())
                .collect(),
        )
    }

    /// Null never matches, and neither do values of incomparable types.
    pub fn matches(&self, value: &Value) -> bool {
        let Some(key) = value.join_key() else {
            return false;
        };
        match self {
            Condition::Equals(expected) => expected.join_key().is_some_and(|e| e == key),
            Condition::In(values) => values.contains(&key),
            Condition::Compare(CompareOp::Ne, expected) => {
                expected.join_key().is_some_and(|e| e != key)
            }
            Condition::Compare(op, expected) => match compare(value, expected) {
                Some(ord) => match op {
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Gte => ord != Ordering::Less,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Lte => ord != Ordering::Greater,
                    CompareOp::Ne => ord != Ordering::Equal,
                },
                None => false,
            },
            Condition::Satisfies(predicate) => predicate.matches(value),
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
        (Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
        (Value::Date(l), Value::Date(r)) => Some(l.cmp(r)),
        _ => {
            let l = left.as_f64()?;
            let r = right.as_f64()?;
            l.partial_cmp(&r)
        }
    }
}

/// A row promoted to a graph node.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityNode {
    id: String,
    relation: String,
    attributes: BTreeMap<String, Value>,
}

impl EntityNode {
    /// `relation:id`, or `relation:#row` when the relation declares no identifier column.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
}

/// One undirected graph over every row of every relation.
#[derive(Clone, Debug)]
pub struct EntityGraph {
    nodes: Vec<EntityNode>,
    adjacency: Vec<BTreeSet<usize>>,
    by_relation: BTreeMap<String, Vec<usize>>,
    columns: BTreeMap<String, Vec<String>>,
    expansion: ExpansionMode,
}

impl EntityGraph {
    pub fn build(
        store: &RelationStore,
        schema: &EntitySchema,
        expansion: ExpansionMode,
    ) -> FilterResult<Self> {
        schema.validate(store)?;

        let mut nodes = Vec::new();
        let mut by_relation: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut columns = BTreeMap::new();
        let mut keys: HashMap<(String, Value), Vec<usize>> = HashMap::new();

        for relation in store.iter() {
            let name = relation.name();
            let id_idx = schema
                .id_columns
                .get(name)
                .and_then(|column| relation.column_idx(column));
            let members = by_relation.entry(name.to_string()).or_default();
            let mut duplicate_ids = false;

            for (row_idx, row) in relation.rows().iter().enumerate() {
                let idx = nodes.len();
                let id = match id_idx {
                    Some(i) => {
                        if let Some(key) = row[i].join_key() {
                            let entry = keys.entry((name.to_string(), key)).or_default();
                            duplicate_ids |= !entry.is_empty();
                            entry.push(idx);
                        }
                        format!("{name}:{}", row[i])
                    }
                    None => format!("{name}:#{row_idx}"),
                };
                nodes.push(EntityNode {
                    id,
                    relation: name.to_string(),
                    attributes: relation.columns().iter().cloned().zip(row.iter().cloned()).collect(),
                });
                members.push(idx);
            }

            if duplicate_ids {
                log::warn!("relation {name} has duplicate identifier values; each row stays a separate node");
            }
            columns.insert(name.to_string(), relation.columns().to_vec());
        }

        let mut adjacency = vec![BTreeSet::new(); nodes.len()];
        for link in &schema.links {
            let Some(members) = by_relation.get(&link.from_relation) else {
                continue;
            };
            for &from in members {
                let Some(key) = nodes[from]
                    .attribute(&link.join_column)
                    .and_then(Value::join_key)
                else {
                    continue;
                };
                let Some(targets) = keys.get(&(link.to_relation.clone(), key)) else {
                    continue;
                };
                for &to in targets {
                    adjacency[from].insert(to);
                    adjacency[to].insert(from);
                }
            }
        }

        let graph = Self {
            nodes,
            adjacency,
            by_relation,
            columns,
            expansion,
        };
        log::debug!(
            "built entity graph: {} node(s), {} edge(s)",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn node(&self, idx: usize) -> Option<&EntityNode> {
        self.nodes.get(idx)
    }

    pub fn nodes_of(&self, relation: &str) -> &[usize] {
        self.by_relation
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.get(idx).into_iter().flatten().copied()
    }

    pub fn expansion(&self) -> &ExpansionMode {
        &self.expansion
    }

    /// Step 1: nodes whose attributes satisfy every condition.
    pub fn select(&self, conditions: &BTreeMap<String, Condition>) -> BTreeSet<usize> {
        (0..self.nodes.len())
            .filter(|&idx| {
                let node = &self.nodes[idx];
                conditions.iter().all(|(attribute, condition)| {
                    node.attribute(attribute)
                        .is_some_and(|value| condition.matches(value))
                })
            })
            .collect()
    }

    /// Step 1 for relation-scoped predicates: nodes of a targeted relation that satisfy all of
    /// that relation's predicates. With no predicates at all, every node is selected.
    pub fn select_predicates(&self, predicates: &FilterSet) -> FilterResult<BTreeSet<usize>> {
        if predicates.is_empty() {
            return Ok((0..self.nodes.len()).collect());
        }

        let mut selected = BTreeSet::new();
        for (relation, column_predicates) in predicates.iter() {
            let members = self
                .by_relation
                .get(relation)
                .ok_or_else(|| FilterError::UnknownRelation(relation.to_string()))?;
            selected.extend(members.iter().copied().filter(|&idx| {
                let node = &self.nodes[idx];
                column_predicates.iter().all(|p| {
                    node.attribute(&p.column)
                        .is_some_and(|value| p.predicate.matches(value))
                })
            }));
        }
        Ok(selected)
    }

    /// Step 2: breadth-first growth from `seeds` according to the expansion mode.
    pub fn expand(&self, seeds: &BTreeSet<usize>) -> BTreeSet<usize> {
        let allowed: Option<HashSet<(&str, &str)>> = match &self.expansion {
            ExpansionMode::Closure => None,
            ExpansionMode::Guided { hops } => Some(
                hops.iter()
                    .map(|hop| (hop.from.as_str(), hop.to.as_str()))
                    .collect(),
            ),
        };

        let mut expanded = seeds.clone();
        let mut queue: VecDeque<usize> = seeds.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            for neighbor in self.neighbors(node) {
                if expanded.contains(&neighbor) {
                    continue;
                }
                if let Some(allowed) = &allowed {
                    let hop = (
                        self.nodes[node].relation.as_str(),
                        self.nodes[neighbor].relation.as_str(),
                    );
                    if !allowed.contains(&hop) {
                        continue;
                    }
                }
                expanded.insert(neighbor);
                queue.push_back(neighbor);
            }
        }
        expanded
    }

    /// Direct neighbors of `nodes` that belong to `target`.
    pub fn connected(&self, nodes: &BTreeSet<usize>, target: &str) -> BTreeSet<usize> {
        nodes
            .iter()
            .flat_map(|&idx| self.neighbors(idx))
            .filter(|&neighbor| self.nodes[neighbor].relation == target)
            .collect()
    }

    /// Step 3: regroup nodes into relations, preserving source row order. Relations with no
    /// surviving node are absent from the result.
    pub fn materialize(&self, nodes: &BTreeSet<usize>) -> FilterResult<BTreeMap<String, Relation>> {
        let mut out: BTreeMap<String, Relation> = BTreeMap::new();
        for &idx in nodes {
            let Some(node) = self.nodes.get(idx) else {
                continue;
            };
            let columns = self
                .columns
                .get(&node.relation)
                .ok_or_else(|| FilterError::UnknownRelation(node.relation.clone()))?;
            let relation = out
                .entry(node.relation.clone())
                .or_insert_with(|| Relation::new(node.relation.clone(), columns.clone()));
            let row = columns
                .iter()
                .map(|c| node.attributes.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            relation.push_row(row)?;
        }
        Ok(out)
    }

    /// Attribute-keyed filtering across all relations.
    pub fn filter(
        &self,
        conditions: &BTreeMap<String, Condition>,
    ) -> FilterResult<BTreeMap<String, Relation>> {
        let selected = self.select(conditions);
        self.materialize(&self.expand(&selected))
    }

    /// Relation-scoped filtering with the same predicates the propagation strategy takes.
    pub fn filter_predicates(
        &self,
        predicates: &FilterSet,
    ) -> FilterResult<BTreeMap<String, Relation>> {
        let selected = self.select_predicates(predicates)?;
        self.materialize(&self.expand(&selected))
    }
}

impl FilterStrategy for EntityGraph {
    fn name(&self) -> &'static str {
        "entity-graph"
    }

    fn apply(
        &self,
        working: &mut RelationStore,
        _index: &RelationshipIndex,
        predicates: &FilterSet,
    ) -> FilterResult<usize> {
        let selected = self.select_predicates(predicates)?;
        let mut expanded = self.expand(&selected);
        // Expansion may walk back into a targeted relation; only its selected rows may survive.
        expanded.retain(|idx| {
            selected.contains(idx)
                || predicates
                    .predicates_for(&self.nodes[*idx].relation)
                    .is_empty()
        });
        log::debug!(
            "entity graph selected {} node(s), expanded to {}",
            selected.len(),
            expanded.len()
        );

        let mut materialized = self.materialize(&expanded)?;
        let names: Vec<String> = working.names().map(str::to_string).collect();
        for name in names {
            let replacement = match materialized.remove(&name) {
                Some(relation) => relation,
                None => working
                    .relation(&name)
                    .map(Relation::empty_like)
                    .ok_or_else(|| FilterError::UnknownRelation(name.clone()))?,
            };
            working.replace_relation(replacement);
        }
        Ok(expanded.len())
    }
}
