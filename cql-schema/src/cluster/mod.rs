//! This module holds entities that describe the schema of the cluster and
//! the logic fetching it from system tables.
//!
//! This includes:
//! - [metadata] representation of keyspaces, tables, views, types and
//!   functions, together with the per-generation fetchers,
//! - the [registry] of known hosts and their release versions,
//! - the [dispatcher] picking a fetcher for the host a connection talks to.

pub mod dispatcher;
pub mod metadata;
pub mod registry;

pub use dispatcher::{VersionDispatcher, VersionDispatcherBuilder};
pub use registry::{ClusterRegistry, Host};
