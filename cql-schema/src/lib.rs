//! Schema synchronization engine for Cassandra-family CQL databases.
//!
//! Reads keyspace, table, view, user defined type, function and aggregate
//! definitions from the system tables of a server and turns them into
//! immutable, fully resolved descriptors. Layout of the system tables
//! differs between server generations:
//!
//! | Release | Schema tables                 | Type strings |
//! |---------|-------------------------------|--------------|
//! | 1.2     | `system.schema_*`             | class names  |
//! | 2.0     | `system.schema_*` + triggers  | class names  |
//! | 2.1     | + `system.schema_usertypes`   | class names  |
//! | 2.2     | + functions and aggregates    | class names  |
//! | 3.0+    | `system_schema.*`             | CQL          |
//!
//! [VersionDispatcher] picks the right fetcher for each connection, based on
//! the release version a [ClusterRegistry] reports for its host. The
//! connection layer itself is abstracted away by [SchemaConnection].

pub mod cluster;
pub mod connection;
pub mod errors;

pub(crate) mod utils;

pub use cluster::metadata::fetching::{GenerationFetcher, SchemaFetcher};
pub use cluster::metadata::{
    Aggregate, Column, Function, FunctionCollection, Index, Keyspace, MaterializedView, Table,
    Trigger,
};
pub use cluster::{ClusterRegistry, Host, VersionDispatcher, VersionDispatcherBuilder};
pub use connection::{RequestError, Row, RowError, RowSet, SchemaConnection};
pub use errors::MetadataError;
