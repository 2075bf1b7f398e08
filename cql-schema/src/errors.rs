//! Errors returned by the schema fetchers and the version dispatcher.

use std::net::SocketAddr;
use std::num::ParseIntError;

use cql_types::TypeParseError;
use thiserror::Error;

pub use crate::connection::{RequestError, RowError};

/// An error that occurred during a schema fetch.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum MetadataError {
    /// No fetcher could be selected for the connection's host.
    #[error("Failed to select a schema fetcher: {0}")]
    Dispatch(#[from] DispatchError),

    /// A system-table query failed, or returned a malformed row.
    #[error(transparent)]
    FetchError(#[from] MetadataFetchError),

    /// Bad keyspaces metadata.
    #[error("Bad keyspaces metadata: {0}")]
    Keyspaces(#[from] KeyspacesMetadataError),

    /// Bad UDTs metadata.
    #[error("Bad UDTs metadata: {0}")]
    Udts(#[from] UdtMetadataError),

    /// Bad tables metadata.
    #[error("Bad tables metadata: {0}")]
    Tables(#[from] TablesMetadataError),

    /// Bad functions or aggregates metadata.
    #[error("Bad functions metadata: {0}")]
    Functions(#[from] FunctionsMetadataError),
}

/// Failed to pick a fetcher for the host a connection is established to.
///
/// Raised before any query is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Unable to find host {address} in the cluster registry, known hosts: {known:?}")]
    UnknownHost {
        address: SocketAddr,
        known: Vec<SocketAddr>,
    },

    #[error("Unable to determine the release version of host {address}")]
    MissingReleaseVersion { address: SocketAddr },

    #[error("Unsupported release version {version:?}")]
    UnsupportedReleaseVersion { version: String },
}

/// An error that occurred during fetching of a single system table.
#[derive(Error, Debug, Clone)]
#[error("Error during metadata fetch from {table}: {error}")]
#[non_exhaustive]
pub struct MetadataFetchError {
    pub error: MetadataFetchErrorKind,
    pub table: &'static str,
}

/// Cause of a [MetadataFetchError].
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum MetadataFetchErrorKind {
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid row: {0}")]
    Row(#[from] RowError),
}

/// An error that occurred while building keyspace descriptors.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum KeyspacesMetadataError {
    #[error("Keyspace {keyspace} has no replication class")]
    MissingReplicationClass { keyspace: String },

    #[error("Keyspace {keyspace} has invalid JSON in {option}: {reason}")]
    InvalidJson {
        keyspace: String,
        option: &'static str,
        reason: String,
    },
}

/// Failed to interpret a replication class and its options.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyspaceStrategyError {
    #[error("Missing replication factor field for SimpleStrategy")]
    MissingReplicationFactorForSimpleStrategy,

    #[error("Failed to parse a replication factor as unsigned integer: {0}")]
    ReplicationFactorParseError(ParseIntError),

    #[error("Unexpected NetworkTopologyStrategy option: {key}: {value}")]
    UnexpectedNetworkTopologyStrategyOption { key: String, value: String },
}

/// An error that occurred while building user defined types.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum UdtMetadataError {
    #[error("Invalid type {typ:?} of a field of {keyspace}.{type_name}: {error}")]
    InvalidCqlType {
        keyspace: String,
        type_name: String,
        typ: String,
        error: TypeParseError,
    },

    #[error(
        "Type {keyspace}.{type_name} has {names} field names but {types} field types"
    )]
    FieldCountMismatch {
        keyspace: String,
        type_name: String,
        names: usize,
        types: usize,
    },

    /// No progress could be made resolving the remaining types of a keyspace.
    #[error(
        "Unable to resolve circular references among UDTs of keyspace {keyspace}: {type_names:?}"
    )]
    CircularTypeDependency {
        keyspace: String,
        type_names: Vec<String>,
    },
}

/// An error that occurred while building table, view, index or trigger descriptors.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TablesMetadataError {
    #[error("Invalid type {typ:?} of {keyspace}.{table}.{column}: {error}")]
    InvalidCqlType {
        keyspace: String,
        table: String,
        column: String,
        typ: String,
        error: TypeParseError,
    },

    #[error(
        "Unknown column kind '{column_kind}' for {keyspace_name}.{table_name}.{column_name}"
    )]
    UnknownColumnKind {
        keyspace_name: String,
        table_name: String,
        column_name: String,
        column_kind: String,
    },

    #[error("Column {column} of {keyspace}.{table} refers to unknown UDT {name}")]
    MissingUserDefinedType {
        keyspace: String,
        table: String,
        column: String,
        name: String,
    },

    #[error("Partition key column with position {position} is missing from {keyspace}.{table}")]
    IncompletePartitionKey {
        keyspace: String,
        table: String,
        position: i32,
    },

    #[error("Clustering key column with position {position} is missing from {keyspace}.{table}")]
    IncompleteClusteringKey {
        keyspace: String,
        table: String,
        position: i32,
    },

    #[error("Table {keyspace}.{table} has invalid JSON in {option}: {reason}")]
    InvalidJson {
        keyspace: String,
        table: String,
        option: &'static str,
        reason: String,
    },
}

/// An error that occurred while building function or aggregate descriptors.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum FunctionsMetadataError {
    #[error("Invalid type {typ:?} in signature of {keyspace}.{function}: {error}")]
    InvalidCqlType {
        keyspace: String,
        function: String,
        typ: String,
        error: TypeParseError,
    },

    #[error("Signature of {keyspace}.{function} refers to unknown UDT {name}")]
    MissingUserDefinedType {
        keyspace: String,
        function: String,
        name: String,
    },

    #[error(
        "Function {keyspace}.{function} has {names} argument names but {types} argument types"
    )]
    ArgumentCountMismatch {
        keyspace: String,
        function: String,
        names: usize,
        types: usize,
    },

    #[error("Invalid argument type {typ:?} in keyspace {keyspace}: {error}")]
    InvalidArgumentType {
        keyspace: String,
        typ: String,
        error: TypeParseError,
    },

    #[error("Argument type refers to unknown UDT {keyspace}.{name}")]
    UnknownArgumentType { keyspace: String, name: String },
}
