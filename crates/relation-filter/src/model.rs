use crate::engine::{FilterError, FilterResult};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A named, fully materialized table: an ordered column list plus positional rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    name: String,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Relation {
    pub fn new(name: impl Into<String>, columns: Vec<impl Into<String>>) -> Self {
        let name = name.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let column_index = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.clone(), idx))
            .collect();

        Self {
            name,
            columns,
            column_index,
            rows: Vec::new(),
        }
    }

    /// Build a relation and push every row, failing on the first row with the wrong width.
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<impl Into<String>>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> FilterResult<Self> {
        let mut relation = Self::new(name, columns);
        for row in rows {
            relation.push_row(row)?;
        }
        Ok(relation)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index.contains_key(column)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> FilterResult<()> {
        if row.len() != self.columns.len() {
            return Err(FilterError::SchemaMismatch {
                relation: self.name.clone(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        self.rows.push(row);
        Ok(())
    }

    pub fn column_idx(&self, column: &str) -> Option<usize> {
        self.column_index.get(column).copied()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_idx(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// All values of `column`, in row order (nulls included).
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_idx(column)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Distinct non-null join keys of `column`. A missing column has no keys.
    pub fn key_values(&self, column: &str) -> BTreeSet<Value> {
        let Some(idx) = self.column_idx(column) else {
            return BTreeSet::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row[idx].join_key())
            .collect()
    }

    /// Same schema, no rows.
    pub fn empty_like(&self) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            column_index: self.column_index.clone(),
            rows: Vec::new(),
        }
    }

    /// Keep the rows for which `keep` returns true. Returns the number of removed rows.
    pub(crate) fn retain_rows(&mut self, mut keep: impl FnMut(&[Value]) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Keep the rows whose `column` join key is in `keys`. Null keys never survive.
    pub(crate) fn retain_keys(&mut self, column: &str, keys: &BTreeSet<Value>) -> usize {
        let Some(idx) = self.column_idx(column) else {
            return 0;
        };
        self.retain_rows(|row| row[idx].join_key().is_some_and(|key| keys.contains(&key)))
    }
}

/// The named relations an engine operates on, ordered by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationStore {
    relations: BTreeMap<String, Relation>,
}

impl RelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_relations(relations: impl IntoIterator<Item = Relation>) -> FilterResult<Self> {
        let mut store = Self::new();
        for relation in relations {
            store.add_relation(relation)?;
        }
        Ok(store)
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub(crate) fn relation_mut(&mut self, name: &str) -> Option<&mut Relation> {
        self.relations.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn add_relation(&mut self, relation: Relation) -> FilterResult<()> {
        let name = relation.name.clone();
        if self.relations.contains_key(&name) {
            return Err(FilterError::DuplicateRelation { relation: name });
        }
        self.relations.insert(name, relation);
        Ok(())
    }

    /// Insert `relation`, returning the relation it replaced, if any.
    pub fn replace_relation(&mut self, relation: Relation) -> Option<Relation> {
        self.relations.insert(relation.name.clone(), relation)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        self.relations
            .iter()
            .map(|(name, relation)| (name.clone(), relation.row_count()))
            .collect()
    }

    pub fn into_relations(self) -> BTreeMap<String, Relation> {
        self.relations
    }
}
