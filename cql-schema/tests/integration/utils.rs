use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use cql_schema::{RequestError, Row, RowSet, SchemaConnection};
use cql_types::{ColumnType, CqlValue};

pub(crate) const MARSHAL: &str = "org.apache.cassandra.db.marshal.";

pub(crate) fn setup_tracing() {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(tracing_subscriber::fmt::TestWriter::new())
        .try_init();
}

pub(crate) fn marshal(class: &str) -> String {
    format!("{MARSHAL}{class}")
}

pub(crate) fn text_list(items: &[&str]) -> CqlValue {
    CqlValue::List(items.iter().map(|item| CqlValue::from(*item)).collect())
}

pub(crate) fn text_map(entries: &[(&str, &str)]) -> CqlValue {
    CqlValue::Map(
        entries
            .iter()
            .map(|(key, value)| (CqlValue::from(*key), CqlValue::from(*value)))
            .collect(),
    )
}

pub(crate) fn addr(last: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, last], 9042))
}

/// In-memory stand-in for a server, answering `SELECT * FROM <table>`
/// queries from prepared rows.
///
/// Equality filters of the `WHERE` clause are honored, both for bound
/// values and for inlined literals. Tables without prepared rows are empty.
pub(crate) struct ScriptedConnection {
    address: SocketAddr,
    tables: HashMap<String, Vec<Row>>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedConnection {
    pub(crate) fn new() -> Self {
        Self::at(addr(1))
    }

    pub(crate) fn at(address: SocketAddr) -> Self {
        Self {
            address,
            tables: HashMap::new(),
            failing: HashSet::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_rows(mut self, table: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        self.tables
            .entry(table.to_owned())
            .or_default()
            .extend(rows);
        self
    }

    /// Makes every query against `table` fail.
    pub(crate) fn failing(mut self, table: &str) -> Self {
        self.failing.insert(table.to_owned());
        self
    }

    /// Tables queried so far, in order.
    pub(crate) fn queried_tables(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|cql| parse_select(cql).0.to_owned())
            .collect()
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

/// Splits a schema query into its table and its `column = value` filters.
fn parse_select(cql: &str) -> (&str, Vec<(&str, &str)>) {
    let rest = cql
        .strip_prefix("SELECT * FROM ")
        .unwrap_or_else(|| panic!("Unexpected query: {cql}"));
    let (table, conditions) = match rest.split_once(" WHERE ") {
        Some((table, conditions)) => (table, conditions),
        None => (rest, ""),
    };
    let filters = conditions
        .split(" AND ")
        .filter(|condition| !condition.is_empty())
        .map(|condition| {
            condition
                .split_once(" = ")
                .unwrap_or_else(|| panic!("Unexpected condition: {condition}"))
        })
        .collect();
    (table, filters)
}

#[async_trait]
impl SchemaConnection for ScriptedConnection {
    fn address(&self) -> SocketAddr {
        self.address
    }

    async fn send_query(
        &self,
        cql: &str,
        values: &[CqlValue],
        hints: &[ColumnType],
    ) -> Result<RowSet, RequestError> {
        assert_eq!(values.len(), hints.len());
        self.queries.lock().unwrap().push(cql.to_owned());

        let (table, filters) = parse_select(cql);
        if self.failing.contains(table) {
            return Err(RequestError::DbError(format!("{table} is unavailable")));
        }

        let mut bound = values.iter();
        let filters: Vec<(&str, String)> = filters
            .into_iter()
            .map(|(column, value)| {
                let value = if value == "?" {
                    bound
                        .next()
                        .and_then(CqlValue::as_text)
                        .cloned()
                        .expect("Missing bound value")
                } else {
                    value
                        .strip_prefix('\'')
                        .and_then(|v| v.strip_suffix('\''))
                        .expect("Unquoted literal")
                        .replace("''", "'")
                };
                (column, value)
            })
            .collect();

        Ok(self
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        filters.iter().all(|(column, value)| {
                            row.get(column).and_then(CqlValue::as_text) == Some(value)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
