//! Values of schema-table cells, as handed over by the connection layer.

use std::collections::HashMap;

use uuid::Uuid;

/// A decoded CQL value.
///
/// Only the types that appear in schema tables are represented.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum CqlValue {
    Ascii(String),
    Boolean(bool),
    Blob(Vec<u8>),
    Double(f64),
    Empty,
    Float(f32),
    Int(i32),
    BigInt(i64),
    Text(String),
    List(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    Set(Vec<CqlValue>),
    Timeuuid(Uuid),
    Uuid(Uuid),
}

impl CqlValue {
    pub fn as_ascii(&self) -> Option<&String> {
        match self {
            Self::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the string content of both `text` and `ascii` values.
    pub fn as_text(&self) -> Option<&String> {
        match self {
            Self::Text(s) | Self::Ascii(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as `f64`, widening `float` values.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Returns the value as `i32`, narrowing `bigint` values that fit.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            Self::BigInt(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Self::BigInt(i) => Some(*i),
            Self::Int(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) | Self::Timeuuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Vec<u8>> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<CqlValue>> {
        match self {
            Self::List(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Vec<CqlValue>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Vec<(CqlValue, CqlValue)>> {
        match self {
            Self::Map(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Self::Ascii(s) | Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Collects a list or a set of strings.
    pub fn as_string_seq(&self) -> Option<Vec<String>> {
        match self {
            Self::List(items) | Self::Set(items) => items
                .iter()
                .map(|item| item.as_text().cloned())
                .collect::<Option<Vec<_>>>(),
            _ => None,
        }
    }

    /// Collects a `map<text, text>`.
    pub fn as_string_map(&self) -> Option<HashMap<String, String>> {
        self.as_map()?
            .iter()
            .map(|(k, v)| Some((k.as_text()?.clone(), v.as_text()?.clone())))
            .collect()
    }
}

impl From<&str> for CqlValue {
    fn from(s: &str) -> Self {
        CqlValue::Text(s.to_owned())
    }
}

impl From<String> for CqlValue {
    fn from(s: String) -> Self {
        CqlValue::Text(s)
    }
}

impl From<bool> for CqlValue {
    fn from(b: bool) -> Self {
        CqlValue::Boolean(b)
    }
}

impl From<i32> for CqlValue {
    fn from(i: i32) -> Self {
        CqlValue::Int(i)
    }
}

impl From<f64> for CqlValue {
    fn from(d: f64) -> Self {
        CqlValue::Double(d)
    }
}

impl From<Uuid> for CqlValue {
    fn from(u: Uuid) -> Self {
        CqlValue::Uuid(u)
    }
}

impl From<Vec<u8>> for CqlValue {
    fn from(v: Vec<u8>) -> Self {
        CqlValue::Blob(v)
    }
}
