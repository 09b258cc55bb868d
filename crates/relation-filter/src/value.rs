use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use std::fmt;
use std::sync::Arc;

/// Textual date format accepted for date-range bounds and date-like text cells.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// A scalar cell value.
///
/// Floats are wrapped in [`OrderedFloat`] so that every value is `Eq + Ord + Hash` and can be used
/// as a join key in ordered sets.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    Date(NaiveDate),
    Text(Arc<str>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(n.0),
            _ => None,
        }
    }

    /// Date view of the value. Text cells are accepted when they hold a `YYYY-MM-DD` string.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => NaiveDate::parse_from_str(s, DATE_FORMAT).ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Normalized form used when values are compared as keys.
    ///
    /// `Null` is never a key. Integral floats collapse onto the equivalent integer so that `1` and
    /// `1.0` select the same rows.
    pub fn join_key(&self) -> Option<Value> {
        match self {
            Value::Null => None,
            Value::Number(n)
                if n.0.fract() == 0.0 && n.0 >= i64::MIN as f64 && n.0 < i64::MAX as f64 =>
            {
                Some(Value::Integer(n.0 as i64))
            }
            other => Some(other.clone()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(Arc::from(value))
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{}", n.0),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Text(s) => f.write_str(s),
        }
    }
}
