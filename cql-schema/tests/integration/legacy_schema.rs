use assert_matches::assert_matches;
use cql_schema::cluster::metadata::fetching::{V1_2, V2_0, V2_1, V2_2};
use cql_schema::cluster::metadata::{ClusteringOrder, ColumnType, NativeType};
use cql_schema::{GenerationFetcher, Row, SchemaFetcher};
use cql_types::CqlValue;

use crate::utils::{marshal, setup_tracing, text_list, ScriptedConnection};

const KEYSPACES: &str = "system.schema_keyspaces";
const TABLES: &str = "system.schema_columnfamilies";
const COLUMNS: &str = "system.schema_columns";
const TRIGGERS: &str = "system.schema_triggers";
const USER_TYPES: &str = "system.schema_usertypes";
const FUNCTIONS: &str = "system.schema_functions";
const AGGREGATES: &str = "system.schema_aggregates";

fn keyspace_row(name: &str) -> Row {
    Row::new()
        .with_column("keyspace_name", name)
        .with_column("durable_writes", true)
        .with_column("strategy_class", "org.apache.cassandra.locator.SimpleStrategy")
        .with_column("strategy_options", "{\"replication_factor\":\"1\"}")
}

fn table_row(keyspace: &str, table: &str) -> Row {
    Row::new()
        .with_column("keyspace_name", keyspace)
        .with_column("columnfamily_name", table)
        .with_column("comment", "")
        .with_column("gc_grace_seconds", 864000)
        .with_column(
            "compaction_strategy_class",
            "org.apache.cassandra.db.compaction.SizeTieredCompactionStrategy",
        )
        .with_column("compaction_strategy_options", "{}")
        .with_column(
            "compression_parameters",
            "{\"sstable_compression\":\"org.apache.cassandra.io.compress.SnappyCompressor\"}",
        )
}

fn column_row(keyspace: &str, table: &str, column: &str, validator: &str) -> Row {
    Row::new()
        .with_column("keyspace_name", keyspace)
        .with_column("columnfamily_name", table)
        .with_column("column_name", column)
        .with_column("validator", validator)
}

/// A 1.2 server with a CQL3 table and a compact one.
fn v1_2_server() -> ScriptedConnection {
    let users = table_row("ks", "users")
        .with_column("key_validator", marshal("UUIDType"))
        .with_column(
            "comparator",
            format!("{}({})", marshal("CompositeType"), marshal("UTF8Type")),
        )
        .with_column("default_validator", marshal("BytesType"))
        .with_column("key_aliases", "[\"id\"]")
        .with_column("column_aliases", "[]");
    let events = table_row("ks", "events")
        .with_column("key_validator", marshal("UTF8Type"))
        .with_column("comparator", marshal("TimeUUIDType"))
        .with_column("default_validator", marshal("UTF8Type"))
        .with_column("key_aliases", "[\"source\"]")
        .with_column("column_aliases", "[\"ts\"]")
        .with_column("value_alias", "payload");

    ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks"), keyspace_row("other")])
        .with_rows(TABLES, [users, events])
        .with_rows(
            COLUMNS,
            [
                column_row("ks", "users", "name", &marshal("UTF8Type")),
                column_row("ks", "users", "age", &marshal("Int32Type")),
            ],
        )
}

#[tokio::test]
async fn test_v1_2_fetch_all() {
    setup_tracing();
    let connection = v1_2_server();
    let fetcher = GenerationFetcher::new(&V1_2);

    let keyspaces = fetcher.fetch_all(&connection).await.unwrap();

    assert_eq!(
        keyspaces.iter().map(|ks| ks.name.as_str()).collect::<Vec<_>>(),
        ["ks", "other"]
    );
    assert!(keyspaces[1].tables.is_empty());

    let ks = &keyspaces[0];
    assert!(ks.durable_writes);
    assert_eq!(ks.replication.class, "SimpleStrategy");
    assert!(ks.user_defined_types.is_empty());
    assert!(ks.functions.is_empty());

    let users = ks.table("users").unwrap();
    assert_eq!(users.partition_key[0].name, "id");
    assert_eq!(users.partition_key[0].typ, ColumnType::from(NativeType::Uuid));
    assert!(users.clustering_key.is_empty());
    assert_eq!(users.column_count(), 3);
    assert!(!users.options.compact_storage);
    assert_eq!(users.options.compression["sstable_compression"], "SnappyCompressor");

    let events = ks.table("events").unwrap();
    assert_eq!(events.partition_key[0].name, "source");
    assert_eq!(events.clustering_key[0].name, "ts");
    assert_eq!(events.clustering_key[0].typ, ColumnType::from(NativeType::Timeuuid));
    assert_eq!(events.columns["payload"].typ, ColumnType::from(NativeType::Text));
    assert!(events.options.compact_storage);

    // Tables the generation does not have are never queried.
    let mut queried = connection.queried_tables();
    queried.sort();
    assert_eq!(queried, [TABLES, COLUMNS, KEYSPACES]);
}

#[tokio::test]
async fn test_v1_2_inlines_filters() {
    setup_tracing();
    let connection = v1_2_server();
    let fetcher = GenerationFetcher::new(&V1_2);

    let table = fetcher
        .fetch_table(&connection, "ks", "events")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.name, "events");

    assert!(connection.queries().contains(
        &"SELECT * FROM system.schema_columnfamilies \
          WHERE keyspace_name = 'ks' AND columnfamily_name = 'events'"
            .to_owned()
    ));
}

#[tokio::test]
async fn test_missing_keyspace() {
    setup_tracing();
    let connection = v1_2_server();

    for fetcher in [&V1_2, &V2_0, &V2_1, &V2_2].map(GenerationFetcher::new) {
        assert_eq!(
            fetcher.fetch_keyspace(&connection, "missing").await.unwrap(),
            None
        );
        assert_eq!(
            fetcher
                .fetch_table(&connection, "ks", "missing")
                .await
                .unwrap(),
            None
        );
    }
}

#[tokio::test]
async fn test_v2_0_column_kinds() {
    setup_tracing();
    let comparator = format!(
        "{}({},{})",
        marshal("CompositeType"),
        marshal("Int32Type"),
        marshal("UTF8Type")
    );
    let columns = [
        column_row("ks", "t", "k", &marshal("UTF8Type")).with_column("type", "partition_key"),
        column_row(
            "ks",
            "t",
            "c",
            &format!("{}({})", marshal("ReversedType"), marshal("Int32Type")),
        )
        .with_column("type", "clustering_key")
        .with_column("component_index", 0),
        column_row("ks", "t", "v", &marshal("UTF8Type"))
            .with_column("type", "regular")
            .with_column("component_index", 1),
        column_row("ks", "t", "s", &marshal("DoubleType")).with_column("type", "static"),
    ];
    let trigger = Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("columnfamily_name", "t")
        .with_column("trigger_name", "audit")
        .with_column(
            "trigger_options",
            CqlValue::Map(vec![("class".into(), "com.example.Audit".into())]),
        );
    let connection = ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks")])
        .with_rows(TABLES, [table_row("ks", "t").with_column("comparator", comparator)])
        .with_rows(COLUMNS, columns.clone())
        .with_rows(TRIGGERS, [trigger]);
    let fetcher = GenerationFetcher::new(&V2_0);

    let keyspace = fetcher
        .fetch_keyspace(&connection, "ks")
        .await
        .unwrap()
        .unwrap();
    let table = keyspace.table("t").unwrap();

    let regular = table.columns.values().filter(|c| !c.is_static).count();
    let statics = table.columns.values().filter(|c| c.is_static).count();
    assert_eq!(
        table.partition_key.len() + table.clustering_key.len() + regular + statics,
        columns.len()
    );
    assert_eq!(table.clustering_order, [ClusteringOrder::Descending]);
    assert!(table.columns["s"].is_static);
    assert_eq!(
        table.trigger("audit").unwrap().custom_class_name(),
        Some("com.example.Audit")
    );

    // Bound values rather than literals.
    assert!(connection
        .queries()
        .contains(&"SELECT * FROM system.schema_keyspaces WHERE keyspace_name = ?".to_owned()));

    // 2.0 has no user defined types.
    let queries_before = connection.queries().len();
    assert_eq!(
        fetcher.fetch_type(&connection, "ks", "address").await.unwrap(),
        None
    );
    assert_eq!(connection.queries().len(), queries_before);
}

fn address_type_row() -> Row {
    Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("type_name", "address")
        .with_column("field_names", text_list(&["street", "zip"]))
        .with_column(
            "field_types",
            text_list(&[marshal("UTF8Type").as_str(), marshal("Int32Type").as_str()]),
        )
}

#[tokio::test]
async fn test_v2_1_user_types() {
    setup_tracing();
    // UserType(ks, hex("address"), hex("street"):UTF8Type, hex("zip"):Int32Type)
    let address_class = format!(
        "{}(ks,61646472657373,737472656574:{},7a6970:{})",
        marshal("UserType"),
        marshal("UTF8Type"),
        marshal("Int32Type")
    );
    let comparator = format!("{}({})", marshal("CompositeType"), marshal("UTF8Type"));
    let connection = ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks")])
        .with_rows(TABLES, [table_row("ks", "people").with_column("comparator", comparator)])
        .with_rows(
            COLUMNS,
            [
                column_row("ks", "people", "id", &marshal("UUIDType"))
                    .with_column("type", "partition_key"),
                column_row("ks", "people", "home", &address_class)
                    .with_column("type", "regular")
                    .with_column("component_index", 0),
            ],
        )
        .with_rows(USER_TYPES, [address_type_row()]);
    let fetcher = GenerationFetcher::new(&V2_1);

    let address = fetcher
        .fetch_type(&connection, "ks", "address")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(address.keyspace, "ks");
    assert_eq!(
        address.field_types,
        [
            ("street".to_owned(), NativeType::Text.into()),
            ("zip".to_owned(), NativeType::Int.into())
        ]
    );
    assert_eq!(
        fetcher.fetch_type(&connection, "ks", "missing").await.unwrap(),
        None
    );

    let keyspace = fetcher
        .fetch_keyspace(&connection, "ks")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(keyspace.user_defined_type("address"), Some(&address));
    assert_matches!(
        &keyspace.table("people").unwrap().columns["home"].typ,
        ColumnType::UserDefinedType(udt) if *udt == address
    );
}

fn function_row(name: &str, arguments: &[(&str, &str)], return_type: &str) -> Row {
    let names: Vec<&str> = arguments.iter().map(|(name, _)| *name).collect();
    let types: Vec<String> = arguments.iter().map(|(_, typ)| marshal(typ)).collect();
    Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("function_name", name)
        .with_column("argument_names", text_list(&names))
        .with_column(
            "argument_types",
            text_list(&types.iter().map(String::as_str).collect::<Vec<_>>()),
        )
        .with_column("return_type", marshal(return_type))
        .with_column("language", "java")
        .with_column("body", "return a + b;")
        .with_column("called_on_null_input", false)
}

fn aggregate_row(name: &str, state_func: &str) -> Row {
    Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("aggregate_name", name)
        .with_column("argument_types", text_list(&[marshal("Int32Type").as_str()]))
        .with_column("return_type", marshal("Int32Type"))
        .with_column("state_type", marshal("Int32Type"))
        .with_column("state_func", state_func)
        .with_column("final_func", CqlValue::Empty)
        .with_column("initcond", CqlValue::Blob(vec![0, 0, 0, 0]))
}

fn v2_2_server() -> ScriptedConnection {
    ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks")])
        .with_rows(
            FUNCTIONS,
            [
                function_row("plus", &[("a", "Int32Type"), ("b", "Int32Type")], "Int32Type"),
                function_row("plus", &[("a", "UTF8Type"), ("b", "UTF8Type")], "UTF8Type"),
            ],
        )
        .with_rows(
            AGGREGATES,
            [aggregate_row("total", "plus"), aggregate_row("broken", "nope")],
        )
}

#[tokio::test]
async fn test_v2_2_functions() {
    setup_tracing();
    let connection = v2_2_server();
    let fetcher = GenerationFetcher::new(&V2_2);
    let int = ColumnType::from(NativeType::Int);

    let plus = fetcher
        .fetch_function(&connection, "ks", "plus", &[int.clone(), int.clone()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plus.return_type, int);
    assert_eq!(plus.arguments[1], ("b".to_owned(), int.clone()));
    assert_eq!(plus.language, "java");
    assert!(!plus.called_on_null_input);

    let text_plus = fetcher
        .fetch_function(
            &connection,
            "ks",
            "plus",
            &[ColumnType::from(NativeType::Text), ColumnType::from(NativeType::Text)],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(text_plus.return_type, ColumnType::from(NativeType::Text));

    assert_eq!(
        fetcher
            .fetch_function(&connection, "ks", "plus", &[ColumnType::from(NativeType::Double)])
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_v2_2_aggregates() {
    setup_tracing();
    let connection = v2_2_server();
    let fetcher = GenerationFetcher::new(&V2_2);
    let int = ColumnType::from(NativeType::Int);

    let total = fetcher
        .fetch_aggregate(&connection, "ks", "total", std::slice::from_ref(&int))
        .await
        .unwrap()
        .unwrap();
    let state_function = total.state_function.unwrap();
    assert_eq!(state_function.name, "plus");
    assert_eq!(state_function.return_type, int);
    assert_eq!(total.final_function, None);
    // The blob-encoded initial state is decoded by the state type.
    assert_eq!(total.initial_state.as_deref(), Some("0"));

    let broken = fetcher
        .fetch_aggregate(&connection, "ks", "broken", std::slice::from_ref(&int))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(broken.state_function, None);
    assert_eq!(
        fetcher
            .fetch_aggregate(&connection, "ks", "absent", &[int])
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_v2_2_keyspace_keeps_aggregate_without_state_function() {
    setup_tracing();
    let connection = v2_2_server();
    let fetcher = GenerationFetcher::new(&V2_2);
    let int = ColumnType::from(NativeType::Int);

    let keyspace = fetcher
        .fetch_keyspace(&connection, "ks")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(keyspace.functions.len(), 2);
    let broken = keyspace
        .aggregates
        .get("broken", std::slice::from_ref(&int))
        .unwrap();
    assert_eq!(broken.state_function, None);
    assert!(keyspace
        .aggregates
        .get("total", &[int])
        .unwrap()
        .state_function
        .is_some());
}

#[tokio::test]
async fn test_parse_argument_types_from_class_names() {
    setup_tracing();
    let connection = v2_2_server();
    let fetcher = GenerationFetcher::new(&V2_2);

    let types = fetcher
        .parse_argument_types(
            &connection,
            "ks",
            &[
                marshal("Int32Type"),
                format!("{}({})", marshal("ListType"), marshal("UTF8Type")),
            ],
        )
        .await
        .unwrap();
    assert_eq!(
        types,
        [
            NativeType::Int.into(),
            ColumnType::list(NativeType::Text.into())
        ]
    );
    // Class names embed user defined types, no lookup needed.
    assert!(connection.queries().is_empty());
}
