//! This module holds entities that represent the schema metadata of
//! the cluster, which includes:
//!   - [Keyspace],
//!   - [Replication] and [Strategy] - replication strategy employed by a keyspace,
//!   - [Table],
//!   - [Column],
//!   - [ColumnKind],
//!   - [Index] and [Trigger],
//!   - [MaterializedView],
//!   - [Function], [Aggregate] and [FunctionCollection],
//!   - CQL types (re-exported from cql-types):
//!     - [ColumnType],
//!     - [NativeType],
//!     - [UserDefinedType],
//!     - [CollectionType].
//!
//! All descriptors are built fresh by a fetch and never mutated afterwards.
//! A refreshed table or view produces a new [Keyspace] through
//! [Keyspace::with_table] or [Keyspace::with_view].

pub mod fetching;
pub mod udt_resolver;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::KeyspaceStrategyError;

// Re-export of CQL types.
pub use cql_types::{ClusteringOrder, CollectionType, ColumnType, NativeType, UserDefinedType};

/// Describes a keyspace in the cluster.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Keyspace {
    pub name: String,
    pub durable_writes: bool,
    pub replication: Replication,
    pub tables: HashMap<String, Arc<Table>>,
    pub views: HashMap<String, Arc<MaterializedView>>,
    pub user_defined_types: HashMap<String, UserDefinedType>,
    pub functions: FunctionCollection<Function>,
    pub aggregates: FunctionCollection<Aggregate>,
}

impl Keyspace {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name).map(Arc::as_ref)
    }

    pub fn view(&self, name: &str) -> Option<&MaterializedView> {
        self.views.get(name).map(Arc::as_ref)
    }

    pub fn user_defined_type(&self, name: &str) -> Option<&UserDefinedType> {
        self.user_defined_types.get(name)
    }

    /// Returns a new keyspace with `table` added, or replacing the table
    /// of the same name. `self` is left untouched.
    pub fn with_table(&self, table: Table) -> Keyspace {
        let mut keyspace = self.clone();
        keyspace.tables.insert(table.name.clone(), Arc::new(table));
        keyspace
    }

    /// Like [Keyspace::with_table], for materialized views.
    pub fn with_view(&self, view: MaterializedView) -> Keyspace {
        let mut keyspace = self.clone();
        keyspace
            .views
            .insert(view.view_metadata.name.clone(), Arc::new(view));
        keyspace
    }
}

/// Replication settings of a keyspace.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Replication {
    /// Strategy class, without the `org.apache.cassandra.locator.` package.
    pub class: String,
    /// Strategy options, `class` excluded.
    pub options: HashMap<String, String>,
}

impl Replication {
    pub fn new(class: String, options: HashMap<String, String>) -> Self {
        Self { class, options }
    }

    /// Interprets the replication settings as a well-known [Strategy].
    pub fn strategy(&self) -> Result<Strategy, KeyspaceStrategyError> {
        strategy_from_string_map(&self.class, self.options.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
#[allow(clippy::enum_variant_names)]
pub enum Strategy {
    SimpleStrategy {
        replication_factor: usize,
    },
    NetworkTopologyStrategy {
        // Replication factors of datacenters with given names
        datacenter_repfactors: HashMap<String, usize>,
    },
    LocalStrategy, // replication_factor == 1
    Other {
        name: String,
        data: HashMap<String, String>,
    },
}

fn strategy_from_string_map(
    strategy_name: &str,
    mut strategy_map: HashMap<String, String>,
) -> Result<Strategy, KeyspaceStrategyError> {
    let strategy: Strategy = match strategy_name {
        "org.apache.cassandra.locator.SimpleStrategy" | "SimpleStrategy" => {
            let rep_factor_str: String = strategy_map
                .remove("replication_factor")
                .ok_or(KeyspaceStrategyError::MissingReplicationFactorForSimpleStrategy)?;

            let replication_factor: usize = usize::from_str(&rep_factor_str)
                .map_err(KeyspaceStrategyError::ReplicationFactorParseError)?;

            Strategy::SimpleStrategy { replication_factor }
        }
        "org.apache.cassandra.locator.NetworkTopologyStrategy" | "NetworkTopologyStrategy" => {
            let mut datacenter_repfactors: HashMap<String, usize> =
                HashMap::with_capacity(strategy_map.len());

            for (key, value) in strategy_map.drain() {
                let rep_factor: usize = usize::from_str(&value).map_err(|_| {
                    // Only replication factors per dc are expected here.
                    KeyspaceStrategyError::UnexpectedNetworkTopologyStrategyOption {
                        key: key.clone(),
                        value,
                    }
                })?;

                datacenter_repfactors.insert(key, rep_factor);
            }

            Strategy::NetworkTopologyStrategy {
                datacenter_repfactors,
            }
        }
        "org.apache.cassandra.locator.LocalStrategy" | "LocalStrategy" => Strategy::LocalStrategy,
        _ => Strategy::Other {
            name: strategy_name.to_owned(),
            data: strategy_map,
        },
    };

    Ok(strategy)
}

/// Describes a table in the cluster.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Table {
    /// Name of the owning keyspace.
    pub keyspace: String,
    pub name: String,
    pub partition_key: Vec<Column>,
    pub clustering_key: Vec<Column>,
    /// Sort order of each clustering column, parallel to `clustering_key`.
    pub clustering_order: Vec<ClusteringOrder>,
    /// Regular and static columns, by name.
    pub columns: HashMap<String, Column>,
    pub options: TableOptions,
    pub id: Option<Uuid>,
    pub indexes: Vec<Index>,
    pub triggers: Vec<Trigger>,
}

impl Table {
    /// Looks a column up by name, whatever its kind.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.partition_key
            .iter()
            .chain(self.clustering_key.iter())
            .find(|column| column.name == name)
            .or_else(|| self.columns.get(name))
    }

    /// Total number of columns, key columns included.
    pub fn column_count(&self) -> usize {
        self.partition_key.len() + self.clustering_key.len() + self.columns.len()
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn trigger(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|trigger| trigger.name == name)
    }
}

/// Storage and tuning options of a table.
///
/// Options that a server generation does not report are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct TableOptions {
    pub comment: Option<String>,
    pub read_repair_chance: Option<f64>,
    pub local_read_repair_chance: Option<f64>,
    pub gc_grace_seconds: Option<i32>,
    pub caching: Option<String>,
    pub bloom_filter_fp_chance: Option<f64>,
    pub populate_io_cache_on_flush: Option<bool>,
    pub memtable_flush_period_in_ms: Option<i32>,
    pub default_time_to_live: Option<i32>,
    pub speculative_retry: Option<String>,
    pub index_interval: Option<i32>,
    pub replicate_on_write: Option<bool>,
    pub min_index_interval: Option<i32>,
    pub max_index_interval: Option<i32>,
    pub crc_check_chance: Option<f64>,
    pub compaction: Compaction,
    /// Compression parameters, with the compressor class stripped of
    /// the `org.apache.cassandra.io.compress.` package.
    pub compression: HashMap<String, String>,
    /// Whether the table uses `COMPACT STORAGE`.
    pub compact_storage: bool,
}

/// Compaction strategy of a table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Compaction {
    /// Strategy class, without the `org.apache.cassandra.db.compaction.` package.
    pub class: String,
    pub options: HashMap<String, String>,
}

impl Compaction {
    pub fn new(class: String, options: HashMap<String, String>) -> Self {
        Self { class, options }
    }
}

/// Describes a column of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Column {
    pub name: String,
    pub typ: ColumnType,
    pub order: ClusteringOrder,
    pub frozen: bool,
    pub is_static: bool,
}

impl Column {
    pub fn new(name: String, typ: ColumnType) -> Self {
        Self {
            name,
            typ,
            order: ClusteringOrder::Ascending,
            frozen: false,
            is_static: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ColumnKind {
    Regular,
    Static,
    Clustering,
    PartitionKey,
}

/// [ColumnKind] parse error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnKindFromStrError;

impl std::str::FromStr for ColumnKind {
    type Err = ColumnKindFromStrError;

    /// Accepts both the modern names and the legacy ones
    /// (`clustering_key`, `compact_value`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regular" | "compact_value" => Ok(Self::Regular),
            "static" => Ok(Self::Static),
            "clustering" | "clustering_key" => Ok(Self::Clustering),
            "partition_key" => Ok(Self::PartitionKey),
            _ => Err(ColumnKindFromStrError),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexKind {
    Keys,
    Composites,
    Custom,
}

impl IndexKind {
    /// Parses an index type as stored in schema tables, e.g. `COMPOSITES`.
    pub fn from_schema_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "KEYS" => Some(Self::Keys),
            "COMPOSITES" => Some(Self::Composites),
            "CUSTOM" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Describes a secondary index of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Index {
    pub name: String,
    pub kind: IndexKind,
    /// Indexed expression, e.g. `col`, `keys(col)` or `entries(col)`.
    pub target: String,
    pub options: HashMap<String, String>,
}

impl Index {
    pub fn custom_class_name(&self) -> Option<&str> {
        (self.kind == IndexKind::Custom)
            .then(|| self.options.get("class_name").map(String::as_str))
            .flatten()
    }
}

/// Describes a trigger attached to a table.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Trigger {
    pub name: String,
    pub options: HashMap<String, String>,
}

impl Trigger {
    pub fn custom_class_name(&self) -> Option<&str> {
        self.options.get("class").map(String::as_str)
    }
}

/// Describes a materialized view in the cluster.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct MaterializedView {
    pub view_metadata: Table,
    pub base_table_name: String,
    pub include_all_columns: bool,
    pub where_clause: Option<String>,
}

/// Describes a user defined function.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Function {
    pub keyspace: String,
    pub name: String,
    pub language: String,
    pub return_type: ColumnType,
    /// Arguments, in declaration order.
    pub arguments: Vec<(String, ColumnType)>,
    pub body: String,
    pub called_on_null_input: bool,
}

/// Describes a user defined aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Aggregate {
    pub keyspace: String,
    pub name: String,
    pub return_type: ColumnType,
    pub argument_types: Vec<ColumnType>,
    pub state_type: ColumnType,
    /// Initial state as a CQL literal.
    pub initial_state: Option<String>,
    /// Absent when the server lists a state function that no longer exists.
    pub state_function: Option<Function>,
    pub final_function: Option<Function>,
}

/// Something identified by a name and a list of argument types.
pub trait Signature {
    fn name(&self) -> &str;
    fn argument_types(&self) -> Vec<ColumnType>;
}

impl Signature for Function {
    fn name(&self) -> &str {
        &self.name
    }

    fn argument_types(&self) -> Vec<ColumnType> {
        self.arguments.iter().map(|(_, typ)| typ.clone()).collect()
    }
}

impl Signature for Aggregate {
    fn name(&self) -> &str {
        &self.name
    }

    fn argument_types(&self) -> Vec<ColumnType> {
        self.argument_types.clone()
    }
}

/// Functions or aggregates of a keyspace, keyed by their signature.
///
/// Overloads share a name and differ by argument types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCollection<T> {
    items: HashMap<(String, Vec<ColumnType>), T>,
}

impl<T> Default for FunctionCollection<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T: Signature> FunctionCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item, replacing the one with the same signature.
    pub fn add(&mut self, item: T) {
        let key = (item.name().to_owned(), item.argument_types());
        self.items.insert(key, item);
    }

    pub fn get(&self, name: &str, argument_types: &[ColumnType]) -> Option<&T> {
        self.items
            .get(&(name.to_owned(), argument_types.to_vec()))
    }

    /// Returns all overloads with given name.
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a T> + 'a {
        self.items.values().filter(move |item| item.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Signature> FromIterator<T> for FunctionCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = FunctionCollection::new();
        for item in iter {
            collection.add(item);
        }
        collection
    }
}
