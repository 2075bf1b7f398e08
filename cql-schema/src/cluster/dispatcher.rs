//! Selection of a schema fetcher by the release version of a host.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cql_types::{ColumnType, UserDefinedType};
use dashmap::DashMap;
use tracing::debug;

use super::metadata::fetching::{
    Generation, GenerationFetcher, SchemaFetcher, V1_2, V2_0, V2_1, V2_2, V3_0,
};
use super::metadata::{Aggregate, Function, Keyspace, MaterializedView, Table};
use super::registry::ClusterRegistry;
use crate::connection::SchemaConnection;
use crate::errors::{DispatchError, MetadataError};

type FetcherConstructor = Arc<dyn Fn() -> Arc<dyn SchemaFetcher> + Send + Sync>;

/// A [SchemaFetcher] that forwards every operation to the fetcher
/// registered for the release version of the host a connection is
/// established to.
///
/// Registrations are matched by prefix, in registration order. The fetcher
/// picked for a given version string is constructed once and reused.
pub struct VersionDispatcher {
    registry: Arc<dyn ClusterRegistry>,
    registrations: Vec<(String, FetcherConstructor)>,
    fetchers: DashMap<String, Arc<dyn SchemaFetcher>>,
}

impl VersionDispatcher {
    pub fn builder() -> VersionDispatcherBuilder {
        VersionDispatcherBuilder::new()
    }

    /// Creates a dispatcher supporting every known server generation.
    pub fn with_default_generations(registry: Arc<dyn ClusterRegistry>) -> Self {
        Self::builder().with_default_generations().build(registry)
    }

    /// Returns the fetcher to use for `connection`.
    ///
    /// Fails without sending any query if the host is unknown, did not
    /// report its release version, or runs an unsupported one.
    pub fn fetcher_for(
        &self,
        connection: &dyn SchemaConnection,
    ) -> Result<Arc<dyn SchemaFetcher>, DispatchError> {
        let address = connection.address();
        let host = self
            .registry
            .host_for(address)
            .ok_or_else(|| DispatchError::UnknownHost {
                address,
                known: self.registry.hosts().into_iter().map(|h| h.address).collect(),
            })?;
        let version = host
            .release_version
            .ok_or(DispatchError::MissingReleaseVersion { address })?;

        if let Some(fetcher) = self.fetchers.get(&version) {
            return Ok(Arc::clone(fetcher.value()));
        }

        let (prefix, constructor) = self
            .registrations
            .iter()
            .find(|(prefix, _)| version.starts_with(prefix.as_str()))
            .ok_or_else(|| DispatchError::UnsupportedReleaseVersion {
                version: version.clone(),
            })?;

        debug!(%address, %version, %prefix, "Selected schema fetcher");
        let fetcher = constructor();
        self.fetchers.insert(version, Arc::clone(&fetcher));

        Ok(fetcher)
    }
}

impl fmt::Debug for VersionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionDispatcher")
            .field(
                "registrations",
                &self.registrations.iter().map(|(prefix, _)| prefix).collect::<Vec<_>>(),
            )
            .field("cached_versions", &self.fetchers.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SchemaFetcher for VersionDispatcher {
    async fn fetch_all(
        &self,
        connection: &dyn SchemaConnection,
    ) -> Result<Vec<Keyspace>, MetadataError> {
        self.fetcher_for(connection)?.fetch_all(connection).await
    }

    async fn fetch_keyspace(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
    ) -> Result<Option<Keyspace>, MetadataError> {
        self.fetcher_for(connection)?
            .fetch_keyspace(connection, keyspace)
            .await
    }

    async fn fetch_table(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        table: &str,
    ) -> Result<Option<Table>, MetadataError> {
        self.fetcher_for(connection)?
            .fetch_table(connection, keyspace, table)
            .await
    }

    async fn fetch_materialized_view(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        view: &str,
    ) -> Result<Option<MaterializedView>, MetadataError> {
        self.fetcher_for(connection)?
            .fetch_materialized_view(connection, keyspace, view)
            .await
    }

    async fn fetch_type(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        type_name: &str,
    ) -> Result<Option<UserDefinedType>, MetadataError> {
        self.fetcher_for(connection)?
            .fetch_type(connection, keyspace, type_name)
            .await
    }

    async fn fetch_function(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        function: &str,
        argument_types: &[ColumnType],
    ) -> Result<Option<Function>, MetadataError> {
        self.fetcher_for(connection)?
            .fetch_function(connection, keyspace, function, argument_types)
            .await
    }

    async fn fetch_aggregate(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        aggregate: &str,
        argument_types: &[ColumnType],
    ) -> Result<Option<Aggregate>, MetadataError> {
        self.fetcher_for(connection)?
            .fetch_aggregate(connection, keyspace, aggregate, argument_types)
            .await
    }

    async fn parse_argument_types(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        types: &[String],
    ) -> Result<Vec<ColumnType>, MetadataError> {
        self.fetcher_for(connection)?
            .parse_argument_types(connection, keyspace, types)
            .await
    }
}

/// Configures the registrations of a [VersionDispatcher].
#[derive(Default)]
pub struct VersionDispatcherBuilder {
    registrations: Vec<(String, FetcherConstructor)>,
}

impl VersionDispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` for release versions starting with `prefix`.
    ///
    /// Earlier registrations take precedence.
    pub fn register<F>(mut self, prefix: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Arc<dyn SchemaFetcher> + Send + Sync + 'static,
    {
        self.registrations.push((prefix.into(), Arc::new(constructor)));
        self
    }

    /// Registers a [GenerationFetcher] for `generation`.
    pub fn register_generation(
        self,
        prefix: impl Into<String>,
        generation: &'static Generation,
    ) -> Self {
        self.register(prefix, move || {
            Arc::new(GenerationFetcher::new(generation)) as Arc<dyn SchemaFetcher>
        })
    }

    /// Registers all known server generations.
    pub fn with_default_generations(self) -> Self {
        self.register_generation("1.2", &V1_2)
            .register_generation("2.0", &V2_0)
            .register_generation("2.1", &V2_1)
            .register_generation("2.2", &V2_2)
            .register_generation("3.", &V3_0)
            .register_generation("4.", &V3_0)
            .register_generation("5.", &V3_0)
    }

    pub fn build(self, registry: Arc<dyn ClusterRegistry>) -> VersionDispatcher {
        VersionDispatcher {
            registry,
            registrations: self.registrations,
            fetchers: DashMap::new(),
        }
    }
}

impl fmt::Debug for VersionDispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionDispatcherBuilder")
            .field(
                "registrations",
                &self.registrations.iter().map(|(prefix, _)| prefix).collect::<Vec<_>>(),
            )
            .finish()
    }
}
