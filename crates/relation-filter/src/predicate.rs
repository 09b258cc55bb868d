//! Column-level predicates and their external JSON encoding.
//!
//! The encoding is:
//! - an array of literals is a membership predicate,
//! - an object with `min` and/or `max` is an inclusive numeric range,
//! - an object with `start` and/or `end` is an inclusive `YYYY-MM-DD` date range.
//!
//! `min`/`max` win when an object carries both kinds of keys. Any other shape is rejected.
use crate::engine::{FilterError, FilterResult};
use crate::model::Relation;
use crate::value::{Value, DATE_FORMAT};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// A single-column filter rule.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Keys are stored normalized (see [`Value::join_key`]).
    Membership(BTreeSet<Value>),
    NumericRange { min: f64, max: f64 },
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl Predicate {
    pub fn membership(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Predicate::Membership(
            values
                .into_iter()
                .filter_map(|v| v.into().join_key())
                .collect(),
        )
    }

    pub fn numeric_range(min: Option<f64>, max: Option<f64>) -> Self {
        Predicate::NumericRange {
            min: min.unwrap_or(f64::NEG_INFINITY),
            max: max.unwrap_or(f64::INFINITY),
        }
    }

    /// Date range with textual bounds; an absent bound is 1900-01-01 or 9999-12-31.
    pub fn date_range(start: Option<&str>, end: Option<&str>) -> FilterResult<Self> {
        Ok(Predicate::DateRange {
            start: parse_date(start.unwrap_or("1900-01-01"))?,
            end: parse_date(end.unwrap_or("9999-12-31"))?,
        })
    }

    /// Decode the external predicate encoding.
    pub fn from_json(encoded: &serde_json::Value) -> FilterResult<Self> {
        match encoded {
            serde_json::Value::Array(items) => {
                let values = items
                    .iter()
                    .map(literal_from_json)
                    .collect::<FilterResult<Vec<_>>>()?;
                Ok(Predicate::membership(values))
            }
            serde_json::Value::Object(map) if map.contains_key("min") || map.contains_key("max") => {
                let min = numeric_bound(map.get("min"), "min")?;
                let max = numeric_bound(map.get("max"), "max")?;
                Ok(Predicate::numeric_range(min, max))
            }
            serde_json::Value::Object(map)
                if map.contains_key("start") || map.contains_key("end") =>
            {
                let start = date_bound(map.get("start"), "start")?;
                let end = date_bound(map.get("end"), "end")?;
                Predicate::date_range(start, end)
            }
            serde_json::Value::Object(map) => Err(FilterError::UnsupportedPredicate(format!(
                "object keys {:?} are neither min/max nor start/end",
                map.keys().collect::<Vec<_>>()
            ))),
            other => Err(FilterError::UnsupportedPredicate(format!(
                "expected an array or an object, got {other}"
            ))),
        }
    }

    /// Whether a single cell satisfies the predicate. Null never does.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Predicate::Membership(values) => value.join_key().is_some_and(|key| {
                values.contains(&key)
                    || date_alias(&key).is_some_and(|alias| values.contains(&alias))
            }),
            Predicate::NumericRange { min, max } => value
                .as_f64()
                .is_some_and(|n| *min <= n && n <= *max),
            Predicate::DateRange { start, end } => value
                .as_date()
                .is_some_and(|d| *start <= d && d <= *end),
        }
    }
}

/// The other spelling of a date key: `YYYY-MM-DD` text for a date, and the date for such text.
fn date_alias(key: &Value) -> Option<Value> {
    match key {
        Value::Date(d) => Some(Value::from(d.format(DATE_FORMAT).to_string())),
        Value::Text(_) => key.as_date().map(Value::Date),
        _ => None,
    }
}

fn parse_date(text: &str) -> FilterResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| FilterError::InvalidDate {
        value: text.to_string(),
    })
}

fn literal_from_json(literal: &serde_json::Value) -> FilterResult<Value> {
    match literal {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::String(s) => Ok(Value::from(s.as_str())),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n.as_f64().map(Value::from).ok_or_else(|| {
                FilterError::UnsupportedPredicate(format!("number {n} is out of range"))
            }),
        },
        other => Err(FilterError::UnsupportedPredicate(format!(
            "membership values must be scalars, got {other}"
        ))),
    }
}

fn numeric_bound(bound: Option<&serde_json::Value>, key: &str) -> FilterResult<Option<f64>> {
    match bound {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(FilterError::UnsupportedPredicate(format!(
            "range bound `{key}` must be a number, got {other}"
        ))),
    }
}

fn date_bound<'a>(bound: Option<&'a serde_json::Value>, key: &str) -> FilterResult<Option<&'a str>> {
    match bound {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(FilterError::InvalidDate {
            value: format!("{key}: {other}"),
        }),
    }
}

/// A predicate bound to the column it filters.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnPredicate {
    pub column: String,
    pub predicate: Predicate,
}

impl ColumnPredicate {
    pub fn new(column: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            column: column.into(),
            predicate,
        }
    }
}

/// Filter `relation` down to the rows whose `column` satisfies `predicate`.
pub fn evaluate(relation: &Relation, column: &str, predicate: &Predicate) -> FilterResult<Relation> {
    let mut out = relation.clone();
    apply(&mut out, column, predicate)?;
    Ok(out)
}

/// In-place form of [`evaluate`]. Returns the number of removed rows.
pub(crate) fn apply(relation: &mut Relation, column: &str, predicate: &Predicate) -> FilterResult<usize> {
    let idx = relation
        .column_idx(column)
        .ok_or_else(|| FilterError::UnknownColumn {
            relation: relation.name().to_string(),
            column: column.to_string(),
        })?;
    Ok(relation.retain_rows(|row| predicate.matches(&row[idx])))
}

/// Apply predicates one at a time (logical AND), returning the rows removed by each.
///
/// The final row set does not depend on the order; the per-predicate counts do, and identify
/// which predicate actually narrowed the relation.
pub(crate) fn apply_all(
    relation: &mut Relation,
    predicates: &[ColumnPredicate],
) -> FilterResult<Vec<usize>> {
    predicates
        .iter()
        .map(|p| apply(relation, &p.column, &p.predicate))
        .collect()
}

/// Predicates grouped by the relation they target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSet {
    predicates: BTreeMap<String, Vec<ColumnPredicate>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        relation: impl Into<String>,
        column: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        self.push(relation, column, predicate);
        self
    }

    pub fn push(
        &mut self,
        relation: impl Into<String>,
        column: impl Into<String>,
        predicate: Predicate,
    ) {
        self.predicates
            .entry(relation.into())
            .or_default()
            .push(ColumnPredicate::new(column, predicate));
    }

    /// Decode `{relation: {column: predicate}}`.
    pub fn from_json(encoded: &serde_json::Value) -> FilterResult<Self> {
        let serde_json::Value::Object(relations) = encoded else {
            return Err(FilterError::UnsupportedPredicate(format!(
                "filter set must be an object keyed by relation, got {encoded}"
            )));
        };

        let mut set = Self::new();
        for (relation, columns) in relations {
            let serde_json::Value::Object(columns) = columns else {
                return Err(FilterError::UnsupportedPredicate(format!(
                    "predicates for {relation} must be an object keyed by column, got {columns}"
                )));
            };
            for (column, encoded) in columns {
                set.push(relation.as_str(), column.as_str(), Predicate::from_json(encoded)?);
            }
        }
        Ok(set)
    }

    pub fn predicates_for(&self, relation: &str) -> &[ColumnPredicate] {
        self.predicates
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ColumnPredicate])> {
        self.predicates
            .iter()
            .map(|(relation, predicates)| (relation.as_str(), predicates.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}
