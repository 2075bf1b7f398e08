//! Fetching of schema metadata from system tables.
//!
//! Every supported server generation is described by a [Generation] rule
//! record: which system tables exist, how their filters are bound, how types
//! and options are encoded and how the columns of a table are laid out. A
//! single [GenerationFetcher] implements [SchemaFetcher] on top of any of them.

mod legacy;
mod modern;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cql_types::{
    parse_class_name, parse_cql_type, ClusteringOrder, ColumnType, CqlValue, NativeType,
    ParsedComponent, TypeParseError, TypeResolution, UdtLookup, UserDefinedType,
};
use itertools::Itertools;
use tracing::{debug, trace, warn};

use super::udt_resolver::{resolve_user_types, RawUserType};
use super::{
    Aggregate, Column, Function, FunctionCollection, Keyspace, MaterializedView, Replication,
    Signature, Table, TableOptions,
};
use crate::connection::{Row, RowSet, SchemaConnection};
use crate::errors::{
    FunctionsMetadataError, MetadataError, MetadataFetchError, RowError, TablesMetadataError,
};

const REPLICATION_PACKAGE_PREFIX: &str = "org.apache.cassandra.locator.";
const COMPACTION_PACKAGE_PREFIX: &str = "org.apache.cassandra.db.compaction.";
const COMPRESSION_PACKAGE_PREFIX: &str = "org.apache.cassandra.io.compress.";

/// Names of the system tables a generation stores its schema in.
///
/// `None` marks a table the generation does not have; queries against it
/// are never sent and yield no rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct SchemaTables {
    pub keyspaces: &'static str,
    pub tables: &'static str,
    pub columns: &'static str,
    /// Column holding the table name in `tables`, `columns`, `indexes`
    /// and `triggers`.
    pub table_name_column: &'static str,
    pub types: Option<&'static str>,
    pub functions: Option<&'static str>,
    pub aggregates: Option<&'static str>,
    pub indexes: Option<&'static str>,
    pub triggers: Option<&'static str>,
    pub views: Option<&'static str>,
}

/// How filter values are passed to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BindStyle {
    /// Quoted literals inlined into the query string.
    Inline,
    /// `?` markers with `varchar` values.
    Bound,
}

/// Encoding of type strings in schema rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TypeEncoding {
    /// `org.apache.cassandra.db.marshal.*` class names.
    ClassName,
    /// CQL type syntax, with user defined types referred to by name.
    Cql,
}

/// How the key and regular columns of a table are described.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TableLayout {
    /// Inferred from the comparator, the key validator and alias lists.
    Comparator,
    /// Explicit `type` and `component_index` on each column row.
    ComponentIndex,
    /// Explicit `kind` and `position` on each column row, table `flags`.
    Flags,
}

/// Encoding of table and keyspace options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum OptionsEncoding {
    /// JSON documents stored in text columns.
    Json,
    /// Native CQL maps.
    Native,
}

/// Schema fetching rules of a single server generation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub struct Generation {
    pub name: &'static str,
    pub tables: SchemaTables,
    pub bind_style: BindStyle,
    pub type_encoding: TypeEncoding,
    pub table_layout: TableLayout,
    pub options_encoding: OptionsEncoding,
    /// Used for tables that do not report a bloom filter false positive chance.
    pub default_bloom_filter_fp_chance: Option<f64>,
}

const LEGACY_TABLES: SchemaTables = SchemaTables {
    keyspaces: "system.schema_keyspaces",
    tables: "system.schema_columnfamilies",
    columns: "system.schema_columns",
    table_name_column: "columnfamily_name",
    types: None,
    functions: None,
    aggregates: None,
    indexes: None,
    triggers: None,
    views: None,
};

pub const V1_2: Generation = Generation {
    name: "1.2",
    tables: LEGACY_TABLES,
    bind_style: BindStyle::Inline,
    type_encoding: TypeEncoding::ClassName,
    table_layout: TableLayout::Comparator,
    options_encoding: OptionsEncoding::Json,
    default_bloom_filter_fp_chance: Some(0.01),
};

pub const V2_0: Generation = Generation {
    name: "2.0",
    tables: SchemaTables {
        triggers: Some("system.schema_triggers"),
        ..LEGACY_TABLES
    },
    bind_style: BindStyle::Bound,
    table_layout: TableLayout::ComponentIndex,
    default_bloom_filter_fp_chance: None,
    ..V1_2
};

pub const V2_1: Generation = Generation {
    name: "2.1",
    tables: SchemaTables {
        types: Some("system.schema_usertypes"),
        ..V2_0.tables
    },
    ..V2_0
};

pub const V2_2: Generation = Generation {
    name: "2.2",
    tables: SchemaTables {
        functions: Some("system.schema_functions"),
        aggregates: Some("system.schema_aggregates"),
        ..V2_1.tables
    },
    ..V2_1
};

pub const V3_0: Generation = Generation {
    name: "3.0",
    tables: SchemaTables {
        keyspaces: "system_schema.keyspaces",
        tables: "system_schema.tables",
        columns: "system_schema.columns",
        table_name_column: "table_name",
        types: Some("system_schema.types"),
        functions: Some("system_schema.functions"),
        aggregates: Some("system_schema.aggregates"),
        indexes: Some("system_schema.indexes"),
        triggers: Some("system_schema.triggers"),
        views: Some("system_schema.views"),
    },
    bind_style: BindStyle::Bound,
    type_encoding: TypeEncoding::Cql,
    table_layout: TableLayout::Flags,
    options_encoding: OptionsEncoding::Native,
    default_bloom_filter_fp_chance: None,
};

/// Fetches schema metadata through a connection.
///
/// Every operation sends its queries concurrently and fails as soon as any
/// of them fails; no partial result is ever returned. Operations looking up
/// a single entity return `Ok(None)` when it does not exist.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    /// Fetches all keyspaces, in the order the server lists them.
    async fn fetch_all(
        &self,
        connection: &dyn SchemaConnection,
    ) -> Result<Vec<Keyspace>, MetadataError>;

    async fn fetch_keyspace(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
    ) -> Result<Option<Keyspace>, MetadataError>;

    async fn fetch_table(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        table: &str,
    ) -> Result<Option<Table>, MetadataError>;

    async fn fetch_materialized_view(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        view: &str,
    ) -> Result<Option<MaterializedView>, MetadataError>;

    async fn fetch_type(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        type_name: &str,
    ) -> Result<Option<UserDefinedType>, MetadataError>;

    /// Fetches the overload of `function` taking `argument_types`.
    async fn fetch_function(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        function: &str,
        argument_types: &[ColumnType],
    ) -> Result<Option<Function>, MetadataError>;

    /// Fetches the overload of `aggregate` taking `argument_types`.
    async fn fetch_aggregate(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        aggregate: &str,
        argument_types: &[ColumnType],
    ) -> Result<Option<Aggregate>, MetadataError>;

    /// Parses argument type strings, as found in schema change events,
    /// in the type encoding of the server.
    async fn parse_argument_types(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        types: &[String],
    ) -> Result<Vec<ColumnType>, MetadataError>;
}

/// [SchemaFetcher] driven by a [Generation].
#[derive(Clone, Copy, Debug)]
pub struct GenerationFetcher {
    generation: &'static Generation,
}

impl GenerationFetcher {
    pub fn new(generation: &'static Generation) -> Self {
        Self { generation }
    }

    pub fn generation(&self) -> &'static Generation {
        self.generation
    }

    async fn select(
        &self,
        connection: &dyn SchemaConnection,
        table: Option<&'static str>,
        filters: &[(&str, &str)],
    ) -> Result<RowSet, MetadataFetchError> {
        let Some(table) = table else {
            return Ok(Vec::new());
        };

        let query = SchemaQuery::new(self.generation.bind_style, table, filters);
        trace!(table, cql = %query.cql, "Querying schema table");

        connection
            .send_query(&query.cql, &query.values, &query.hints)
            .await
            .map_err(|error| MetadataFetchError {
                error: error.into(),
                table,
            })
    }

    /// Types table, if the generation refers to UDTs by name.
    fn udt_table(&self) -> Option<&'static str> {
        match self.generation.type_encoding {
            TypeEncoding::Cql => self.generation.tables.types,
            TypeEncoding::ClassName => None,
        }
    }

    fn type_context<'a>(&self, udts: &'a UdtLookup) -> TypeContext<'a> {
        TypeContext {
            encoding: self.generation.type_encoding,
            udts,
        }
    }

    fn resolve_types(&self, keyspace: &str, rows: RowSet) -> Result<UdtLookup, MetadataError> {
        let table = self.generation.tables.types.unwrap_or_default();
        let raw_types = rows
            .iter()
            .map(|row| -> Result<_, RowError> {
                Ok(RawUserType {
                    name: row.text("type_name")?.to_owned(),
                    field_names: row.string_list("field_names")?,
                    field_types: row.string_list("field_types")?,
                })
            })
            .collect::<Result<Vec<_>, RowError>>()
            .with_table(table)?;

        let udts = match self.generation.type_encoding {
            TypeEncoding::Cql => resolve_user_types(keyspace, raw_types, parse_cql_type)?,
            TypeEncoding::ClassName => resolve_user_types(keyspace, raw_types, |typ, _| {
                let component = parse_first_class_name(typ)?;
                Ok(TypeResolution::Resolved {
                    typ: component.typ,
                    frozen: component.frozen,
                })
            })?,
        };

        Ok(udts)
    }

    fn build_keyspace(&self, row: &Row, rows: KeyspaceRows) -> Result<Keyspace, MetadataError> {
        let t = &self.generation.tables;
        let name = row.text("keyspace_name").with_table(t.keyspaces)?.to_owned();
        let durable_writes = row
            .opt_boolean("durable_writes")
            .with_table(t.keyspaces)?
            .unwrap_or(true);
        let replication = self.replication(&name, row)?;

        let udts = self.resolve_types(&name, rows.types)?;
        let types = self.type_context(&udts);

        let functions = rows
            .functions
            .iter()
            .map(|row| self.build_function(row, types))
            .collect::<Result<FunctionCollection<_>, _>>()?;
        let aggregates = rows
            .aggregates
            .iter()
            .map(|row| self.build_aggregate(row, &functions, types))
            .collect::<Result<FunctionCollection<_>, _>>()?;

        let mut columns = group_rows(rows.columns, t.table_name_column, t.columns)?;
        let mut indexes = group_rows(
            rows.indexes,
            t.table_name_column,
            t.indexes.unwrap_or_default(),
        )?;
        let mut triggers = group_rows(
            rows.triggers,
            t.table_name_column,
            t.triggers.unwrap_or_default(),
        )?;

        let tables = rows
            .tables
            .iter()
            .map(|table_row| -> Result<_, MetadataError> {
                let table_name = table_row.text(t.table_name_column).with_table(t.tables)?;
                let table_rows = TableRows {
                    columns: columns.remove(table_name).unwrap_or_default(),
                    indexes: indexes.remove(table_name).unwrap_or_default(),
                    triggers: triggers.remove(table_name).unwrap_or_default(),
                };
                let table = self.build_table(&name, table_row, table_rows, types)?;
                Ok((table.name.clone(), Arc::new(table)))
            })
            .collect::<Result<HashMap<_, _>, MetadataError>>()?;

        let views_table = t.views.unwrap_or_default();
        let views = rows
            .views
            .iter()
            .map(|view_row| -> Result<_, MetadataError> {
                let view_name = view_row.text("view_name").with_table(views_table)?;
                let view_columns = columns.remove(view_name).unwrap_or_default();
                let view = modern::build_view(
                    self.generation,
                    &name,
                    view_row,
                    view_columns,
                    types,
                )?;
                Ok((view.view_metadata.name.clone(), Arc::new(view)))
            })
            .collect::<Result<HashMap<_, _>, MetadataError>>()?;

        Ok(Keyspace {
            name,
            durable_writes,
            replication,
            tables,
            views,
            user_defined_types: udts,
            functions,
            aggregates,
        })
    }

    fn replication(&self, keyspace: &str, row: &Row) -> Result<Replication, MetadataError> {
        match self.generation.options_encoding {
            OptionsEncoding::Json => legacy::replication(&self.generation.tables, keyspace, row),
            OptionsEncoding::Native => modern::replication(&self.generation.tables, keyspace, row),
        }
    }

    fn build_table(
        &self,
        keyspace: &str,
        row: &Row,
        rows: TableRows,
        types: TypeContext<'_>,
    ) -> Result<Table, MetadataError> {
        match self.generation.table_layout {
            TableLayout::Comparator => {
                legacy::build_comparator_table(self.generation, keyspace, row, rows, types)
            }
            TableLayout::ComponentIndex => {
                legacy::build_component_index_table(self.generation, keyspace, row, rows, types)
            }
            TableLayout::Flags => modern::build_table(self.generation, keyspace, row, rows, types),
        }
    }

    fn build_function(
        &self,
        row: &Row,
        types: TypeContext<'_>,
    ) -> Result<Function, MetadataError> {
        let table = self.generation.tables.functions.unwrap_or_default();
        let keyspace = row.text("keyspace_name").with_table(table)?;
        let name = row.text("function_name").with_table(table)?;
        let argument_names = row.string_list("argument_names").with_table(table)?;
        let argument_types = row.string_list("argument_types").with_table(table)?;

        if argument_names.len() != argument_types.len() {
            return Err(FunctionsMetadataError::ArgumentCountMismatch {
                keyspace: keyspace.to_owned(),
                function: name.to_owned(),
                names: argument_names.len(),
                types: argument_types.len(),
            }
            .into());
        }

        let arguments = argument_names
            .into_iter()
            .zip(argument_types.iter())
            .map(|(argument, typ)| -> Result<_, FunctionsMetadataError> {
                Ok((argument, types.function_type(keyspace, name, typ)?))
            })
            .collect::<Result<Vec<_>, FunctionsMetadataError>>()?;
        let return_type =
            types.function_type(keyspace, name, row.text("return_type").with_table(table)?)?;

        Ok(Function {
            keyspace: keyspace.to_owned(),
            name: name.to_owned(),
            language: row.text("language").with_table(table)?.to_owned(),
            return_type,
            arguments,
            body: row.text("body").with_table(table)?.to_owned(),
            called_on_null_input: row
                .opt_boolean("called_on_null_input")
                .with_table(table)?
                .unwrap_or(false),
        })
    }

    fn build_aggregate(
        &self,
        row: &Row,
        functions: &FunctionCollection<Function>,
        types: TypeContext<'_>,
    ) -> Result<Aggregate, MetadataError> {
        let table = self.generation.tables.aggregates.unwrap_or_default();
        let keyspace = row.text("keyspace_name").with_table(table)?;
        let name = row.text("aggregate_name").with_table(table)?;

        let return_type =
            types.function_type(keyspace, name, row.text("return_type").with_table(table)?)?;
        let state_type =
            types.function_type(keyspace, name, row.text("state_type").with_table(table)?)?;
        let argument_types = row
            .string_list("argument_types")
            .with_table(table)?
            .iter()
            .map(|typ| types.function_type(keyspace, name, typ))
            .collect::<Result<Vec<_>, _>>()?;

        // The state function takes the state followed by the aggregate arguments.
        let state_func = row.text("state_func").with_table(table)?;
        let state_signature = std::iter::once(state_type.clone())
            .chain(argument_types.iter().cloned())
            .collect::<Vec<_>>();
        let state_function = functions.get(state_func, &state_signature).cloned();
        if state_function.is_none() {
            warn!(
                keyspace,
                aggregate = name,
                state_func,
                "State function of aggregate not found"
            );
        }

        let final_function = match row
            .opt_text("final_func")
            .with_table(table)?
            .filter(|final_func| !final_func.is_empty())
        {
            Some(final_func) => {
                let found = functions
                    .get(final_func, std::slice::from_ref(&state_type))
                    .cloned();
                if found.is_none() {
                    warn!(
                        keyspace,
                        aggregate = name,
                        final_func,
                        "Final function of aggregate not found"
                    );
                }
                found
            }
            None => None,
        };

        let initial_state = match row.get("initcond") {
            None => None,
            Some(CqlValue::Blob(bytes)) => Some(blob_literal(bytes, &state_type)),
            Some(value) => value.as_text().cloned(),
        };

        Ok(Aggregate {
            keyspace: keyspace.to_owned(),
            name: name.to_owned(),
            return_type,
            argument_types,
            state_type,
            initial_state,
            state_function,
            final_function,
        })
    }
}

#[async_trait]
impl SchemaFetcher for GenerationFetcher {
    async fn fetch_all(
        &self,
        connection: &dyn SchemaConnection,
    ) -> Result<Vec<Keyspace>, MetadataError> {
        let t = &self.generation.tables;
        let (keyspaces, tables, columns, types, functions, aggregates, indexes, triggers, views) =
            tokio::try_join!(
                self.select(connection, Some(t.keyspaces), &[]),
                self.select(connection, Some(t.tables), &[]),
                self.select(connection, Some(t.columns), &[]),
                self.select(connection, t.types, &[]),
                self.select(connection, t.functions, &[]),
                self.select(connection, t.aggregates, &[]),
                self.select(connection, t.indexes, &[]),
                self.select(connection, t.triggers, &[]),
                self.select(connection, t.views, &[]),
            )?;

        let mut tables = group_rows(tables, "keyspace_name", t.tables)?;
        let mut columns = group_rows(columns, "keyspace_name", t.columns)?;
        let mut types = group_rows(types, "keyspace_name", t.types.unwrap_or_default())?;
        let mut functions =
            group_rows(functions, "keyspace_name", t.functions.unwrap_or_default())?;
        let mut aggregates =
            group_rows(aggregates, "keyspace_name", t.aggregates.unwrap_or_default())?;
        let mut indexes = group_rows(indexes, "keyspace_name", t.indexes.unwrap_or_default())?;
        let mut triggers = group_rows(triggers, "keyspace_name", t.triggers.unwrap_or_default())?;
        let mut views = group_rows(views, "keyspace_name", t.views.unwrap_or_default())?;

        let mut result = Vec::with_capacity(keyspaces.len());
        for row in keyspaces {
            let name = row.text("keyspace_name").with_table(t.keyspaces)?;
            let rows = KeyspaceRows {
                tables: tables.remove(name).unwrap_or_default(),
                columns: columns.remove(name).unwrap_or_default(),
                types: types.remove(name).unwrap_or_default(),
                functions: functions.remove(name).unwrap_or_default(),
                aggregates: aggregates.remove(name).unwrap_or_default(),
                indexes: indexes.remove(name).unwrap_or_default(),
                triggers: triggers.remove(name).unwrap_or_default(),
                views: views.remove(name).unwrap_or_default(),
            };
            let keyspace = self.build_keyspace(&row, rows)?;
            result.push(keyspace);
        }

        debug!(
            generation = self.generation.name,
            keyspaces = result.len(),
            "Fetched schema"
        );

        Ok(result)
    }

    async fn fetch_keyspace(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
    ) -> Result<Option<Keyspace>, MetadataError> {
        let t = &self.generation.tables;
        let filter = [("keyspace_name", keyspace)];
        let (keyspaces, tables, columns, types, functions, aggregates, indexes, triggers, views) =
            tokio::try_join!(
                self.select(connection, Some(t.keyspaces), &filter),
                self.select(connection, Some(t.tables), &filter),
                self.select(connection, Some(t.columns), &filter),
                self.select(connection, t.types, &filter),
                self.select(connection, t.functions, &filter),
                self.select(connection, t.aggregates, &filter),
                self.select(connection, t.indexes, &filter),
                self.select(connection, t.triggers, &filter),
                self.select(connection, t.views, &filter),
            )?;

        let Some(row) = keyspaces.into_iter().next() else {
            debug!(keyspace, "Keyspace not found");
            return Ok(None);
        };

        let rows = KeyspaceRows {
            tables,
            columns,
            types,
            functions,
            aggregates,
            indexes,
            triggers,
            views,
        };
        self.build_keyspace(&row, rows).map(Some)
    }

    async fn fetch_table(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        table: &str,
    ) -> Result<Option<Table>, MetadataError> {
        let t = &self.generation.tables;
        let keyspace_filter = [("keyspace_name", keyspace)];
        let filter = [("keyspace_name", keyspace), (t.table_name_column, table)];
        let (tables, columns, indexes, triggers, types) = tokio::try_join!(
            self.select(connection, Some(t.tables), &filter),
            self.select(connection, Some(t.columns), &filter),
            self.select(connection, t.indexes, &filter),
            self.select(connection, t.triggers, &filter),
            self.select(connection, self.udt_table(), &keyspace_filter),
        )?;

        let Some(row) = tables.into_iter().next() else {
            return Ok(None);
        };

        let udts = self.resolve_types(keyspace, types)?;
        let rows = TableRows {
            columns,
            indexes,
            triggers,
        };
        self.build_table(keyspace, &row, rows, self.type_context(&udts))
            .map(Some)
    }

    async fn fetch_materialized_view(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        view: &str,
    ) -> Result<Option<MaterializedView>, MetadataError> {
        let t = &self.generation.tables;
        if t.views.is_none() {
            return Ok(None);
        }

        let keyspace_filter = [("keyspace_name", keyspace)];
        let view_filter = [("keyspace_name", keyspace), ("view_name", view)];
        let column_filter = [("keyspace_name", keyspace), (t.table_name_column, view)];
        let (views, columns, types) = tokio::try_join!(
            self.select(connection, t.views, &view_filter),
            self.select(connection, Some(t.columns), &column_filter),
            self.select(connection, self.udt_table(), &keyspace_filter),
        )?;

        let Some(row) = views.into_iter().next() else {
            return Ok(None);
        };

        let udts = self.resolve_types(keyspace, types)?;
        modern::build_view(
            self.generation,
            keyspace,
            &row,
            columns,
            self.type_context(&udts),
        )
        .map(Some)
    }

    async fn fetch_type(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        type_name: &str,
    ) -> Result<Option<UserDefinedType>, MetadataError> {
        let t = &self.generation.tables;
        if t.types.is_none() {
            return Ok(None);
        }

        // Types referred to by name can only be resolved together with the
        // rest of the keyspace.
        let rows = match self.generation.type_encoding {
            TypeEncoding::Cql => {
                self.select(connection, t.types, &[("keyspace_name", keyspace)])
                    .await?
            }
            TypeEncoding::ClassName => {
                self.select(
                    connection,
                    t.types,
                    &[("keyspace_name", keyspace), ("type_name", type_name)],
                )
                .await?
            }
        };

        let mut udts = self.resolve_types(keyspace, rows)?;
        Ok(udts.remove(type_name))
    }

    async fn fetch_function(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        function: &str,
        argument_types: &[ColumnType],
    ) -> Result<Option<Function>, MetadataError> {
        let t = &self.generation.tables;
        if t.functions.is_none() {
            return Ok(None);
        }

        let keyspace_filter = [("keyspace_name", keyspace)];
        let filter = [("keyspace_name", keyspace), ("function_name", function)];
        let (functions, types) = tokio::try_join!(
            self.select(connection, t.functions, &filter),
            self.select(connection, self.udt_table(), &keyspace_filter),
        )?;

        let udts = self.resolve_types(keyspace, types)?;
        let types = self.type_context(&udts);
        for row in functions.iter() {
            let overload = self.build_function(row, types)?;
            if overload.argument_types() == argument_types {
                return Ok(Some(overload));
            }
        }

        Ok(None)
    }

    async fn fetch_aggregate(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        aggregate: &str,
        argument_types: &[ColumnType],
    ) -> Result<Option<Aggregate>, MetadataError> {
        let t = &self.generation.tables;
        if t.aggregates.is_none() {
            return Ok(None);
        }

        let keyspace_filter = [("keyspace_name", keyspace)];
        let filter = [("keyspace_name", keyspace), ("aggregate_name", aggregate)];
        let (aggregates, functions, types) = tokio::try_join!(
            self.select(connection, t.aggregates, &filter),
            self.select(connection, t.functions, &keyspace_filter),
            self.select(connection, self.udt_table(), &keyspace_filter),
        )?;

        if aggregates.is_empty() {
            return Ok(None);
        }

        let udts = self.resolve_types(keyspace, types)?;
        let types = self.type_context(&udts);
        let functions = functions
            .iter()
            .map(|row| self.build_function(row, types))
            .collect::<Result<FunctionCollection<_>, _>>()?;

        for row in aggregates.iter() {
            let overload = self.build_aggregate(row, &functions, types)?;
            if overload.argument_types == argument_types {
                return Ok(Some(overload));
            }
        }

        Ok(None)
    }

    async fn parse_argument_types(
        &self,
        connection: &dyn SchemaConnection,
        keyspace: &str,
        types: &[String],
    ) -> Result<Vec<ColumnType>, MetadataError> {
        let rows = self
            .select(connection, self.udt_table(), &[("keyspace_name", keyspace)])
            .await?;
        let udts = self.resolve_types(keyspace, rows)?;
        let context = self.type_context(&udts);

        types
            .iter()
            .map(|typ| {
                context
                    .resolve(typ)
                    .map(|component| component.typ)
                    .map_err(|failure| {
                        MetadataError::from(match failure {
                            TypeFailure::Invalid(error) => {
                                FunctionsMetadataError::InvalidArgumentType {
                                    keyspace: keyspace.to_owned(),
                                    typ: typ.clone(),
                                    error,
                                }
                            }
                            TypeFailure::MissingUdt(name) => {
                                FunctionsMetadataError::UnknownArgumentType {
                                    keyspace: keyspace.to_owned(),
                                    name,
                                }
                            }
                        })
                    })
            })
            .collect()
    }
}

/// A schema query, ready to be sent.
#[derive(Debug, PartialEq)]
struct SchemaQuery {
    cql: String,
    values: Vec<CqlValue>,
    hints: Vec<ColumnType>,
}

impl SchemaQuery {
    fn new(bind_style: BindStyle, table: &str, filters: &[(&str, &str)]) -> Self {
        let mut cql = format!("SELECT * FROM {table}");
        if !filters.is_empty() {
            let conditions = filters
                .iter()
                .map(|(column, value)| match bind_style {
                    BindStyle::Inline => format!("{column} = '{}'", value.replace('\'', "''")),
                    BindStyle::Bound => format!("{column} = ?"),
                })
                .join(" AND ");
            cql.push_str(" WHERE ");
            cql.push_str(&conditions);
        }

        let values: Vec<CqlValue> = match bind_style {
            BindStyle::Inline => Vec::new(),
            BindStyle::Bound => filters
                .iter()
                .map(|(_, value)| CqlValue::Text((*value).to_owned()))
                .collect(),
        };
        let hints = vec![ColumnType::Native(NativeType::Text); values.len()];

        Self { cql, values, hints }
    }
}

/// Rows making up a single keyspace.
#[derive(Default)]
struct KeyspaceRows {
    tables: RowSet,
    columns: RowSet,
    types: RowSet,
    functions: RowSet,
    aggregates: RowSet,
    indexes: RowSet,
    triggers: RowSet,
    views: RowSet,
}

/// Rows making up a single table.
#[derive(Default)]
struct TableRows {
    columns: RowSet,
    indexes: RowSet,
    triggers: RowSet,
}

/// Attaches the name of the queried table to row errors.
trait RowResultExt<T> {
    fn with_table(self, table: &'static str) -> Result<T, MetadataFetchError>;
}

impl<T> RowResultExt<T> for Result<T, RowError> {
    fn with_table(self, table: &'static str) -> Result<T, MetadataFetchError> {
        self.map_err(|error| MetadataFetchError {
            error: error.into(),
            table,
        })
    }
}

fn group_rows(
    rows: RowSet,
    column: &str,
    table: &'static str,
) -> Result<HashMap<String, Vec<Row>>, MetadataFetchError> {
    let keyed = rows
        .into_iter()
        .map(|row| -> Result<_, RowError> {
            let key = row.text(column)?.to_owned();
            Ok((key, row))
        })
        .collect::<Result<Vec<_>, RowError>>()
        .with_table(table)?;

    Ok(keyed.into_iter().into_group_map())
}

fn strip_package(class: &str, prefix: &str) -> String {
    class.strip_prefix(prefix).unwrap_or(class).to_owned()
}

fn parse_first_class_name(typ: &str) -> Result<ParsedComponent, TypeParseError> {
    parse_class_name(typ)?
        .into_first()
        .ok_or_else(|| TypeParseError::EmptyTypeName(typ.to_owned()))
}

/// Renders a serialized value of `typ` as a CQL literal.
///
/// Scalar native types are decoded; anything else, and any value whose
/// length does not match its type, is rendered as a blob literal.
fn blob_literal(bytes: &[u8], typ: &ColumnType) -> String {
    let decoded = match typ {
        ColumnType::Native(native) => match native {
            NativeType::Int => <[u8; 4]>::try_from(bytes)
                .ok()
                .map(|b| i32::from_be_bytes(b).to_string()),
            NativeType::BigInt | NativeType::Counter | NativeType::Timestamp => {
                <[u8; 8]>::try_from(bytes)
                    .ok()
                    .map(|b| i64::from_be_bytes(b).to_string())
            }
            NativeType::SmallInt => <[u8; 2]>::try_from(bytes)
                .ok()
                .map(|b| i16::from_be_bytes(b).to_string()),
            NativeType::TinyInt => match bytes {
                [b] => Some(i8::from_be_bytes([*b]).to_string()),
                _ => None,
            },
            NativeType::Boolean => match bytes {
                [b] => Some((*b != 0).to_string()),
                _ => None,
            },
            NativeType::Float => <[u8; 4]>::try_from(bytes)
                .ok()
                .map(|b| f32::from_be_bytes(b).to_string()),
            NativeType::Double => <[u8; 8]>::try_from(bytes)
                .ok()
                .map(|b| f64::from_be_bytes(b).to_string()),
            NativeType::Text | NativeType::Ascii => std::str::from_utf8(bytes)
                .ok()
                .map(|text| format!("'{}'", text.replace('\'', "''"))),
            NativeType::Uuid | NativeType::Timeuuid => {
                uuid::Uuid::from_slice(bytes).ok().map(|u| u.to_string())
            }
            _ => None,
        },
        _ => None,
    };
    decoded.unwrap_or_else(|| format!("0x{}", hex::encode(bytes)))
}

/// Orders key columns by position, checking that no position is missing.
///
/// Returns the first missing position on failure.
fn validate_key_columns(mut key_columns: Vec<(i32, Column)>) -> Result<Vec<Column>, i32> {
    key_columns.sort_unstable_by_key(|(position, _)| *position);

    key_columns
        .into_iter()
        .enumerate()
        .map(|(idx, (position, column))| {
            let idx = i32::try_from(idx).unwrap_or(i32::MAX);
            if idx == position {
                Ok(column)
            } else {
                Err(idx)
            }
        })
        .collect::<Result<Vec<_>, _>>()
}

enum TypeFailure {
    Invalid(TypeParseError),
    MissingUdt(String),
}

/// Resolves type strings of a single keyspace.
#[derive(Clone, Copy)]
struct TypeContext<'a> {
    encoding: TypeEncoding,
    udts: &'a UdtLookup,
}

impl TypeContext<'_> {
    fn resolve(&self, typ: &str) -> Result<ParsedComponent, TypeFailure> {
        match self.encoding {
            TypeEncoding::ClassName => parse_first_class_name(typ).map_err(TypeFailure::Invalid),
            TypeEncoding::Cql => match parse_cql_type(typ, self.udts) {
                Ok(TypeResolution::Resolved { typ, frozen }) => Ok(ParsedComponent {
                    typ,
                    order: ClusteringOrder::Ascending,
                    frozen,
                }),
                Ok(TypeResolution::Deferred { missing }) => Err(TypeFailure::MissingUdt(missing)),
                Err(error) => Err(TypeFailure::Invalid(error)),
            },
        }
    }

    fn table_column(
        &self,
        keyspace: &str,
        table: &str,
        column: &str,
        typ: &str,
    ) -> Result<ParsedComponent, TablesMetadataError> {
        self.resolve(typ).map_err(|failure| match failure {
            TypeFailure::Invalid(error) => TablesMetadataError::InvalidCqlType {
                keyspace: keyspace.to_owned(),
                table: table.to_owned(),
                column: column.to_owned(),
                typ: typ.to_owned(),
                error,
            },
            TypeFailure::MissingUdt(name) => TablesMetadataError::MissingUserDefinedType {
                keyspace: keyspace.to_owned(),
                table: table.to_owned(),
                column: column.to_owned(),
                name,
            },
        })
    }

    fn function_type(
        &self,
        keyspace: &str,
        function: &str,
        typ: &str,
    ) -> Result<ColumnType, FunctionsMetadataError> {
        self.resolve(typ)
            .map(|component| component.typ)
            .map_err(|failure| match failure {
                TypeFailure::Invalid(error) => FunctionsMetadataError::InvalidCqlType {
                    keyspace: keyspace.to_owned(),
                    function: function.to_owned(),
                    typ: typ.to_owned(),
                    error,
                },
                TypeFailure::MissingUdt(name) => FunctionsMetadataError::MissingUserDefinedType {
                    keyspace: keyspace.to_owned(),
                    function: function.to_owned(),
                    name,
                },
            })
    }
}

/// Builds table options, shared by all table layouts.
fn table_options(
    generation: &Generation,
    keyspace: &str,
    table: &str,
    row: &Row,
    compact_storage: bool,
) -> Result<TableOptions, MetadataError> {
    match generation.options_encoding {
        OptionsEncoding::Json => {
            legacy::table_options(generation, keyspace, table, row, compact_storage)
        }
        OptionsEncoding::Native => modern::table_options(generation, row, compact_storage),
    }
}
