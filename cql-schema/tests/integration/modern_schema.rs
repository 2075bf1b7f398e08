use assert_matches::assert_matches;
use cql_schema::cluster::metadata::fetching::V3_0;
use cql_schema::cluster::metadata::{ColumnType, IndexKind, NativeType, Strategy};
use cql_schema::errors::{MetadataFetchError, UdtMetadataError};
use cql_schema::{GenerationFetcher, MetadataError, Row, SchemaFetcher};
use cql_types::CqlValue;

use crate::utils::{setup_tracing, text_list, text_map, ScriptedConnection};

const KEYSPACES: &str = "system_schema.keyspaces";
const TABLES: &str = "system_schema.tables";
const COLUMNS: &str = "system_schema.columns";
const TYPES: &str = "system_schema.types";
const FUNCTIONS: &str = "system_schema.functions";
const AGGREGATES: &str = "system_schema.aggregates";
const INDEXES: &str = "system_schema.indexes";
const VIEWS: &str = "system_schema.views";

fn keyspace_row(name: &str) -> Row {
    Row::new()
        .with_column("keyspace_name", name)
        .with_column("durable_writes", false)
        .with_column(
            "replication",
            text_map(&[
                ("class", "org.apache.cassandra.locator.NetworkTopologyStrategy"),
                ("dc1", "3"),
                ("dc2", "2"),
            ]),
        )
}

fn table_row(table: &str, flags: &[&str]) -> Row {
    Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("table_name", table)
        .with_column("flags", CqlValue::Set(flags.iter().map(|f| CqlValue::from(*f)).collect()))
        .with_column("comment", "users by id")
        .with_column("default_time_to_live", 0)
        .with_column(
            "compaction",
            text_map(&[(
                "class",
                "org.apache.cassandra.db.compaction.SizeTieredCompactionStrategy",
            )]),
        )
}

fn column_row(table: &str, column: &str, kind: &str, position: i32, typ: &str) -> Row {
    Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("table_name", table)
        .with_column("column_name", column)
        .with_column("kind", kind)
        .with_column("position", position)
        .with_column("type", typ)
        .with_column("clustering_order", "none")
}

fn type_row(name: &str, fields: &[(&str, &str)]) -> Row {
    let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    let types: Vec<&str> = fields.iter().map(|(_, typ)| *typ).collect();
    Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("type_name", name)
        .with_column("field_names", text_list(&names))
        .with_column("field_types", text_list(&types))
}

fn users_columns() -> Vec<Row> {
    vec![
        column_row("users", "id", "partition_key", 0, "uuid"),
        column_row("users", "bucket", "partition_key", 1, "int"),
        column_row("users", "joined", "clustering", 0, "timestamp")
            .with_column("clustering_order", "desc"),
        column_row("users", "name", "regular", -1, "text"),
        column_row("users", "home", "regular", -1, "frozen<address>"),
        column_row("users", "emails", "regular", -1, "set<text>"),
        column_row("users", "region", "static", -1, "text"),
    ]
}

/// A 3.x server whose `ks` keyspace has a table, a view, a few user defined
/// types listed out of dependency order, and a function with an aggregate.
fn v3_server() -> ScriptedConnection {
    let view = Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("view_name", "users_by_name")
        .with_column("base_table_name", "users")
        .with_column("include_all_columns", true)
        .with_column("where_clause", "name IS NOT NULL");
    let index = Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("table_name", "users")
        .with_column("index_name", "users_emails")
        .with_column("kind", "COMPOSITES")
        .with_column("options", text_map(&[("target", "values(emails)")]));
    let function = Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("function_name", "longest")
        .with_column("argument_names", text_list(&["a", "b"]))
        .with_column("argument_types", text_list(&["text", "text"]))
        .with_column("return_type", "text")
        .with_column("language", "lua")
        .with_column("body", "return #a > #b and a or b")
        .with_column("called_on_null_input", true);
    let aggregate = Row::new()
        .with_column("keyspace_name", "ks")
        .with_column("aggregate_name", "longest_of")
        .with_column("argument_types", text_list(&["text"]))
        .with_column("return_type", "text")
        .with_column("state_type", "text")
        .with_column("state_func", "longest")
        .with_column("final_func", "missing_final")
        .with_column("initcond", "''");

    ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks"), keyspace_row("empty")])
        .with_rows(TABLES, [table_row("users", &["compound"])])
        .with_rows(
            COLUMNS,
            users_columns().into_iter().chain([
                column_row("users_by_name", "name", "partition_key", 0, "text"),
                column_row("users_by_name", "id", "clustering", 0, "uuid"),
                column_row("users_by_name", "bucket", "clustering", 1, "int"),
                column_row("users_by_name", "joined", "clustering", 2, "timestamp"),
            ]),
        )
        .with_rows(
            TYPES,
            [
                type_row("address", &[("street", "text"), ("city", "frozen<city>")]),
                type_row("city", &[("name", "text"), ("zip", "frozen<zip>")]),
                type_row("zip", &[("code", "int")]),
            ],
        )
        .with_rows(INDEXES, [index])
        .with_rows(VIEWS, [view])
        .with_rows(FUNCTIONS, [function])
        .with_rows(AGGREGATES, [aggregate])
}

#[tokio::test]
async fn test_fetch_all() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);

    let keyspaces = fetcher.fetch_all(&connection).await.unwrap();
    assert_eq!(
        keyspaces.iter().map(|ks| ks.name.as_str()).collect::<Vec<_>>(),
        ["ks", "empty"]
    );

    let ks = &keyspaces[0];
    assert!(!ks.durable_writes);
    assert_eq!(ks.replication.class, "NetworkTopologyStrategy");
    assert_matches!(
        ks.replication.strategy(),
        Ok(Strategy::NetworkTopologyStrategy { datacenter_repfactors })
            if datacenter_repfactors.len() == 2 && datacenter_repfactors["dc1"] == 3
    );

    assert_eq!(ks.user_defined_types.len(), 3);
    assert_eq!(
        ks.user_defined_type("address")
            .unwrap()
            .field_type("city")
            .unwrap()
            .to_string(),
        "city"
    );

    let users = ks.table("users").unwrap();
    assert_eq!(users.column_count(), users_columns().len());
    assert_eq!(
        users.partition_key.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ["id", "bucket"]
    );
    assert_eq!(users.columns["home"].typ.to_string(), "address");
    assert!(users.columns["home"].frozen);
    assert!(users.columns["region"].is_static);
    assert_eq!(users.options.comment.as_deref(), Some("users by id"));
    assert_eq!(users.options.compaction.class, "SizeTieredCompactionStrategy");

    let index = users.index("users_emails").unwrap();
    assert_eq!(index.kind, IndexKind::Composites);
    assert_eq!(index.target, "values(emails)");

    let view = ks.view("users_by_name").unwrap();
    assert_eq!(view.base_table_name, "users");
    assert!(view.include_all_columns);
    assert_eq!(view.view_metadata.clustering_key.len(), 3);
    // View columns are not mistaken for table columns.
    assert!(ks.table("users_by_name").is_none());

    let text = ColumnType::from(NativeType::Text);
    let longest = ks
        .functions
        .get("longest", &[text.clone(), text.clone()])
        .unwrap();
    assert!(longest.called_on_null_input);
    let longest_of = ks
        .aggregates
        .get("longest_of", &[text])
        .unwrap();
    assert_eq!(longest_of.state_function.as_ref(), Some(longest));
    assert_eq!(longest_of.final_function, None);
    assert_eq!(longest_of.initial_state.as_deref(), Some("''"));
}

#[tokio::test]
async fn test_fetch_table_resolves_user_types() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);

    let users = fetcher
        .fetch_table(&connection, "ks", "users")
        .await
        .unwrap()
        .unwrap();

    assert_matches!(
        &users.columns["home"].typ,
        ColumnType::UserDefinedType(address) if address.field_types.len() == 2
    );
    assert_eq!(
        users.columns["emails"].typ,
        ColumnType::set(NativeType::Text.into())
    );
    assert!(connection.queries().contains(
        &"SELECT * FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?".to_owned()
    ));
}

#[tokio::test]
async fn test_fetch_materialized_view() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);

    let view = fetcher
        .fetch_materialized_view(&connection, "ks", "users_by_name")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.view_metadata.name, "users_by_name");
    assert_eq!(view.view_metadata.partition_key[0].name, "name");
    assert_eq!(view.where_clause.as_deref(), Some("name IS NOT NULL"));

    assert_eq!(
        fetcher
            .fetch_materialized_view(&connection, "ks", "users")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_fetch_type() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);

    let city = fetcher
        .fetch_type(&connection, "ks", "city")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(city.field_type("zip").unwrap().to_string(), "zip");

    assert_eq!(
        fetcher.fetch_type(&connection, "ks", "missing").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_circular_user_types() {
    setup_tracing();
    let connection = ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks")])
        .with_rows(
            TYPES,
            [
                type_row("a", &[("b", "frozen<b>")]),
                type_row("b", &[("a", "frozen<a>")]),
            ],
        );
    let fetcher = GenerationFetcher::new(&V3_0);

    assert_matches!(
        fetcher.fetch_keyspace(&connection, "ks").await,
        Err(MetadataError::Udts(UdtMetadataError::CircularTypeDependency { type_names, .. }))
            if type_names == ["a", "b"]
    );
}

#[tokio::test]
async fn test_fetch_function_and_aggregate() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);
    let text = ColumnType::from(NativeType::Text);

    let longest = fetcher
        .fetch_function(&connection, "ks", "longest", &[text.clone(), text.clone()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(longest.language, "lua");

    let longest_of = fetcher
        .fetch_aggregate(&connection, "ks", "longest_of", &[text])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(longest_of.state_function, Some(longest));
}

#[tokio::test]
async fn test_parse_argument_types() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);

    let types = fetcher
        .parse_argument_types(
            &connection,
            "ks",
            &["frozen<address>".to_owned(), "map<text, int>".to_owned()],
        )
        .await
        .unwrap();

    assert_matches!(&types[0], ColumnType::UserDefinedType(udt) if udt.name == "address");
    assert_eq!(
        types[1],
        ColumnType::map(NativeType::Text.into(), NativeType::Int.into())
    );
}

#[tokio::test]
async fn test_missing_keyspace() {
    setup_tracing();
    let connection = v3_server();
    let fetcher = GenerationFetcher::new(&V3_0);

    assert_eq!(
        fetcher.fetch_keyspace(&connection, "missing").await.unwrap(),
        None
    );
    assert!(fetcher
        .fetch_keyspace(&connection, "empty")
        .await
        .unwrap()
        .is_some_and(|ks| ks.tables.is_empty() && ks.user_defined_types.is_empty()));
}

#[tokio::test]
async fn test_query_failure_fails_whole_fetch() {
    setup_tracing();
    let connection = v3_server().failing(COLUMNS);
    let fetcher = GenerationFetcher::new(&V3_0);

    assert_matches!(
        fetcher.fetch_all(&connection).await,
        Err(MetadataError::FetchError(MetadataFetchError { table, .. })) if table == COLUMNS
    );
    assert_matches!(
        fetcher.fetch_table(&connection, "ks", "users").await,
        Err(MetadataError::FetchError(MetadataFetchError { table, .. })) if table == COLUMNS
    );
}

#[tokio::test]
async fn test_vector_columns_and_fields() {
    setup_tracing();
    let connection = ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks")])
        .with_rows(TABLES, [table_row("emb", &["compound"])])
        .with_rows(
            COLUMNS,
            [
                column_row("emb", "id", "partition_key", 0, "int"),
                column_row("emb", "v", "regular", -1, "vector<float, 3>"),
                column_row("emb", "e", "regular", -1, "frozen<emb_t>"),
            ],
        )
        .with_rows(TYPES, [type_row("emb_t", &[("v", "vector<float, 3>")])]);
    let fetcher = GenerationFetcher::new(&V3_0);
    let vector = ColumnType::vector(NativeType::Float.into(), 3);

    let keyspaces = fetcher.fetch_all(&connection).await.unwrap();
    let emb = keyspaces[0].table("emb").unwrap();
    assert_eq!(emb.columns["v"].typ, vector);
    assert_eq!(emb.columns["v"].typ.to_string(), "vector<float, 3>");

    let emb_t = keyspaces[0].user_defined_type("emb_t").unwrap();
    assert_eq!(emb_t.field_type("v"), Some(&vector));
    assert_matches!(
        &emb.columns["e"].typ,
        ColumnType::UserDefinedType(udt) if udt == emb_t
    );
}

#[tokio::test]
async fn test_quoted_custom_column_type() {
    setup_tracing();
    let class_name = "org.apache.cassandra.db.marshal.DynamicCompositeType(\
        a=>org.apache.cassandra.db.marshal.BytesType,\
        b=>org.apache.cassandra.db.marshal.UTF8Type)";
    let connection = ScriptedConnection::new()
        .with_rows(KEYSPACES, [keyspace_row("ks")])
        .with_rows(TABLES, [table_row("dyn", &["compound"])])
        .with_rows(
            COLUMNS,
            [
                column_row("dyn", "id", "partition_key", 0, "int"),
                column_row("dyn", "c", "regular", -1, &format!("'{class_name}'")),
            ],
        );
    let fetcher = GenerationFetcher::new(&V3_0);

    let table = fetcher
        .fetch_table(&connection, "ks", "dyn")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(table.columns["c"].typ, ColumnType::Custom(class_name.to_owned()));
}
