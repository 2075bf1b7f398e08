//! Boundary to the connection layer.
//!
//! The schema engine does not talk to the network by itself. It issues
//! system-table queries through a [SchemaConnection] and reads the
//! already-decoded result rows through [Row].

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use cql_types::{ColumnType, CqlValue};
use thiserror::Error;
use uuid::Uuid;

/// Rows returned by a single query, in server order.
pub type RowSet = Vec<Row>;

/// A connection able to run a single-page, row-returning query.
#[async_trait]
pub trait SchemaConnection: Send + Sync {
    /// Address of the host this connection is established to.
    fn address(&self) -> SocketAddr;

    /// Sends `cql` with bound `values`, serialized according to `hints`.
    ///
    /// `values` and `hints` have the same length; both are empty for
    /// queries without bind markers.
    async fn send_query(
        &self,
        cql: &str,
        values: &[CqlValue],
        hints: &[ColumnType],
    ) -> Result<RowSet, RequestError>;
}

/// An error returned by the connection layer for a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestError {
    /// Database sent a response containing an error with a message.
    #[error("Database returned an error: {0}")]
    DbError(String),

    /// The connection broke while the request was in flight.
    #[error("Connection broken: {0}")]
    BrokenConnection(String),

    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    /// The server responded with something other than rows.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Failed to read a column of a result row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RowError {
    #[error("Required column {column} is missing or null")]
    MissingColumn { column: String },

    #[error("Column {column} has an unexpected type, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },
}

/// A single result row, addressable by column name.
///
/// A column that is absent and a column holding a null are
/// indistinguishable: both read as `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: HashMap<String, CqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [Row::insert].
    pub fn with_column(mut self, name: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<CqlValue>) {
        self.columns.insert(name.into(), value.into());
    }

    /// Returns the raw value of a column, `None` if absent or null.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        match self.columns.get(name) {
            None | Some(CqlValue::Empty) => None,
            Some(value) => Some(value),
        }
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &'static str,
        convert: impl FnOnce(&'a CqlValue) -> Option<T>,
    ) -> Result<Option<T>, RowError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        convert(value)
            .map(Some)
            .ok_or_else(|| RowError::TypeMismatch {
                column: name.to_owned(),
                expected,
            })
    }

    fn required<T>(name: &str, value: Option<T>) -> Result<T, RowError> {
        value.ok_or_else(|| RowError::MissingColumn {
            column: name.to_owned(),
        })
    }

    pub fn text(&self, name: &str) -> Result<&str, RowError> {
        Self::required(name, self.opt_text(name)?)
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<&str>, RowError> {
        self.typed(name, "text", |v| v.as_text().map(String::as_str))
    }

    pub fn opt_boolean(&self, name: &str) -> Result<Option<bool>, RowError> {
        self.typed(name, "boolean", CqlValue::as_boolean)
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i32>, RowError> {
        self.typed(name, "int", CqlValue::as_int)
    }

    pub fn opt_double(&self, name: &str) -> Result<Option<f64>, RowError> {
        self.typed(name, "double", CqlValue::as_double)
    }

    pub fn opt_uuid(&self, name: &str) -> Result<Option<Uuid>, RowError> {
        self.typed(name, "uuid", CqlValue::as_uuid)
    }

    /// Reads a `list<text>` or `set<text>` column; null reads as empty.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, RowError> {
        Ok(self
            .typed(name, "list<text>", CqlValue::as_string_seq)?
            .unwrap_or_default())
    }

    /// Reads a `map<text, text>` column; null reads as empty.
    pub fn string_map(&self, name: &str) -> Result<HashMap<String, String>, RowError> {
        Ok(self
            .typed(name, "map<text, text>", CqlValue::as_string_map)?
            .unwrap_or_default())
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<CqlValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}
