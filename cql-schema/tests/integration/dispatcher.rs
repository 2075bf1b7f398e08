use std::collections::HashMap;
use std::sync::Arc;

use assert_matches::assert_matches;
use cql_schema::errors::DispatchError;
use cql_schema::{ClusterRegistry, Host, MetadataError, Row, SchemaFetcher, VersionDispatcher};
use futures::future::try_join_all;

use crate::utils::{addr, setup_tracing, text_map, ScriptedConnection};

fn registry() -> Arc<dyn ClusterRegistry> {
    let hosts = [
        (addr(1), Some("2.0.17")),
        (addr(2), Some("3.11.4")),
        (addr(3), Some("3.11.4")),
        (addr(4), Some("1.1.12")),
        (addr(5), None),
    ];
    Arc::new(
        hosts
            .into_iter()
            .map(|(address, version)| (address, Host::new(address, version.map(str::to_owned))))
            .collect::<HashMap<_, _>>(),
    )
}

fn legacy_node() -> ScriptedConnection {
    ScriptedConnection::at(addr(1)).with_rows(
        "system.schema_keyspaces",
        [Row::new()
            .with_column("keyspace_name", "ks")
            .with_column("strategy_class", "org.apache.cassandra.locator.SimpleStrategy")
            .with_column("strategy_options", "{\"replication_factor\":\"2\"}")],
    )
}

fn modern_node(last: u8) -> ScriptedConnection {
    ScriptedConnection::at(addr(last)).with_rows(
        "system_schema.keyspaces",
        [Row::new().with_column("keyspace_name", "ks").with_column(
            "replication",
            text_map(&[
                ("class", "org.apache.cassandra.locator.SimpleStrategy"),
                ("replication_factor", "2"),
            ]),
        )],
    )
}

#[tokio::test]
async fn test_dispatches_by_release_version() {
    setup_tracing();
    let dispatcher = VersionDispatcher::with_default_generations(registry());
    let legacy = legacy_node();
    let modern = modern_node(2);

    let (from_legacy, from_modern) = tokio::try_join!(
        dispatcher.fetch_keyspace(&legacy, "ks"),
        dispatcher.fetch_keyspace(&modern, "ks"),
    )
    .unwrap();

    // Same keyspace, described by two different schema layouts.
    assert_eq!(from_legacy, from_modern);
    assert!(legacy
        .queried_tables()
        .iter()
        .all(|table| table.starts_with("system.")));
    assert!(modern
        .queried_tables()
        .iter()
        .all(|table| table.starts_with("system_schema.")));
}

#[tokio::test]
async fn test_concurrent_first_use_shares_fetcher() {
    setup_tracing();
    let dispatcher = VersionDispatcher::with_default_generations(registry());
    let nodes = [modern_node(2), modern_node(3), modern_node(2)];

    let keyspaces = try_join_all(nodes.iter().map(|node| dispatcher.fetch_all(node)))
        .await
        .unwrap();
    assert!(keyspaces
        .iter()
        .all(|keyspaces| keyspaces.iter().any(|ks| ks.name == "ks")));

    let first = dispatcher.fetcher_for(&nodes[0]).unwrap();
    let second = dispatcher.fetcher_for(&nodes[1]).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_dispatch_errors_send_no_queries() {
    setup_tracing();
    let dispatcher = VersionDispatcher::with_default_generations(registry());

    let unsupported = ScriptedConnection::at(addr(4));
    assert_matches!(
        dispatcher.fetch_all(&unsupported).await,
        Err(MetadataError::Dispatch(DispatchError::UnsupportedReleaseVersion { version }))
            if version == "1.1.12"
    );

    let unversioned = ScriptedConnection::at(addr(5));
    assert_matches!(
        dispatcher.fetch_table(&unversioned, "ks", "t").await,
        Err(MetadataError::Dispatch(DispatchError::MissingReleaseVersion { .. }))
    );

    let unknown = ScriptedConnection::at(addr(42));
    assert_matches!(
        dispatcher.fetch_keyspace(&unknown, "ks").await,
        Err(MetadataError::Dispatch(DispatchError::UnknownHost { known, .. })) if known.len() == 5
    );

    for connection in [unsupported, unversioned, unknown] {
        assert!(connection.queries().is_empty());
    }
}
