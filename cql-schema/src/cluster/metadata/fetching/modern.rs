//! Schema stored in the `system_schema` keyspace of 3.0+ servers.

use std::collections::{BTreeMap, HashMap};

use cql_types::ClusteringOrder;
use tracing::{trace, warn};

use super::{
    strip_package, table_options as build_options, validate_key_columns, Generation, RowResultExt,
    SchemaTables, TableRows, TypeContext, COMPACTION_PACKAGE_PREFIX, COMPRESSION_PACKAGE_PREFIX,
    REPLICATION_PACKAGE_PREFIX,
};
use crate::cluster::metadata::{
    Column, ColumnKind, Compaction, Index, IndexKind, MaterializedView, Replication, Table,
    TableOptions, Trigger,
};
use crate::connection::Row;
use crate::errors::{KeyspacesMetadataError, MetadataError, TablesMetadataError};

// Upon migration from thrift to CQL, Cassandra internally creates a surrogate column "value" of
// type EmptyType for dense tables. This resolves into this CQL type name.
const THRIFT_EMPTY_TYPE: &str = "empty";

pub(super) fn replication(
    tables: &SchemaTables,
    keyspace: &str,
    row: &Row,
) -> Result<Replication, MetadataError> {
    let mut options = row.string_map("replication").with_table(tables.keyspaces)?;
    let class = options
        .remove("class")
        .ok_or_else(|| KeyspacesMetadataError::MissingReplicationClass {
            keyspace: keyspace.to_owned(),
        })?;

    Ok(Replication::new(
        strip_package(&class, REPLICATION_PACKAGE_PREFIX),
        options,
    ))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TableFlags {
    dense: bool,
    is_super: bool,
    compound: bool,
}

impl TableFlags {
    fn from_names(flags: &[String]) -> Self {
        let has = |flag: &str| flags.iter().any(|f| f.eq_ignore_ascii_case(flag));
        Self {
            dense: has("dense"),
            is_super: has("super"),
            compound: has("compound"),
        }
    }

    fn is_compact(&self) -> bool {
        self.is_super || self.dense || !self.compound
    }

    /// Compact tables without clustering columns: their columns are
    /// reported as static, next to a surrogate clustering column and value.
    fn is_static_compact(&self) -> bool {
        !self.is_super && !self.dense && !self.compound
    }
}

/// Flags of a materialized view, which are not reported.
const VIEW_FLAGS: TableFlags = TableFlags {
    dense: false,
    is_super: false,
    compound: true,
};

pub(super) fn build_table(
    generation: &Generation,
    keyspace: &str,
    row: &Row,
    rows: TableRows,
    types: TypeContext<'_>,
) -> Result<Table, MetadataError> {
    let t = &generation.tables;
    let name = row.text(t.table_name_column).with_table(t.tables)?;
    let flags = TableFlags::from_names(&row.string_list("flags").with_table(t.tables)?);

    let indexes = build_indexes(t, keyspace, name, &rows.indexes)?;
    let triggers = rows
        .triggers
        .iter()
        .map(|trigger| -> Result<_, MetadataError> {
            let triggers_table = t.triggers.unwrap_or_default();
            Ok(Trigger {
                name: trigger
                    .text("trigger_name")
                    .with_table(triggers_table)?
                    .to_owned(),
                options: trigger.string_map("options").with_table(triggers_table)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = build_columns(generation, keyspace, name, &rows.columns, types, flags)?;
    table.options = build_options(generation, keyspace, name, row, flags.is_compact())?;
    table.id = row.opt_uuid("id").with_table(t.tables)?;
    table.indexes = indexes;
    table.triggers = triggers;

    Ok(table)
}

pub(super) fn build_view(
    generation: &Generation,
    keyspace: &str,
    row: &Row,
    columns: Vec<Row>,
    types: TypeContext<'_>,
) -> Result<MaterializedView, MetadataError> {
    let views_table = generation.tables.views.unwrap_or_default();
    let name = row.text("view_name").with_table(views_table)?;

    let mut view_metadata = build_columns(generation, keyspace, name, &columns, types, VIEW_FLAGS)?;
    view_metadata.options = native_options(views_table, row, VIEW_FLAGS.is_compact())?;
    view_metadata.id = row.opt_uuid("id").with_table(views_table)?;

    Ok(MaterializedView {
        view_metadata,
        base_table_name: row
            .text("base_table_name")
            .with_table(views_table)?
            .to_owned(),
        include_all_columns: row
            .opt_boolean("include_all_columns")
            .with_table(views_table)?
            .unwrap_or(false),
        where_clause: row
            .opt_text("where_clause")
            .with_table(views_table)?
            .map(str::to_owned),
    })
}

/// Builds a table from its column rows, with default options.
fn build_columns(
    generation: &Generation,
    keyspace: &str,
    name: &str,
    rows: &[Row],
    types: TypeContext<'_>,
    flags: TableFlags,
) -> Result<Table, MetadataError> {
    let columns_table = generation.tables.columns;
    let mut partition_key = Vec::new();
    let mut clustering_key = Vec::new();
    let mut columns = HashMap::new();

    for row in rows {
        let column_name = row.text("column_name").with_table(columns_table)?;
        if column_name.is_empty() {
            warn!(keyspace, table = name, "Skipping column row without a name");
            continue;
        }

        let kind_name = row.text("kind").with_table(columns_table)?;
        let kind: ColumnKind = kind_name.parse().map_err(|_| {
            TablesMetadataError::UnknownColumnKind {
                keyspace_name: keyspace.to_owned(),
                table_name: name.to_owned(),
                column_name: column_name.to_owned(),
                column_kind: kind_name.to_owned(),
            }
        })?;
        let typ = row.text("type").with_table(columns_table)?;

        if flags.dense && kind == ColumnKind::Regular && typ == THRIFT_EMPTY_TYPE {
            trace!(keyspace, table = name, column = column_name, "Skipping surrogate column");
            continue;
        }

        let parsed = types.table_column(keyspace, name, column_name, typ)?;
        let order = match row.opt_text("clustering_order").with_table(columns_table)? {
            Some(order) if order.eq_ignore_ascii_case("desc") => ClusteringOrder::Descending,
            _ => ClusteringOrder::Ascending,
        };
        let position = row.opt_int("position").with_table(columns_table)?.unwrap_or(0);

        let column = Column {
            name: column_name.to_owned(),
            typ: parsed.typ,
            order,
            frozen: parsed.frozen,
            is_static: kind == ColumnKind::Static,
        };

        match kind {
            ColumnKind::PartitionKey => partition_key.push((position, column)),
            ColumnKind::Clustering if flags.is_static_compact() => {}
            ColumnKind::Clustering => clustering_key.push((position, column)),
            ColumnKind::Static if flags.is_static_compact() => {
                let column = Column {
                    is_static: false,
                    ..column
                };
                columns.insert(column.name.clone(), column);
            }
            ColumnKind::Regular if flags.is_static_compact() => {}
            _ => {
                columns.insert(column.name.clone(), column);
            }
        }
    }

    let partition_key = validate_key_columns(partition_key).map_err(|position| {
        TablesMetadataError::IncompletePartitionKey {
            keyspace: keyspace.to_owned(),
            table: name.to_owned(),
            position,
        }
    })?;
    let clustering_key = validate_key_columns(clustering_key).map_err(|position| {
        TablesMetadataError::IncompleteClusteringKey {
            keyspace: keyspace.to_owned(),
            table: name.to_owned(),
            position,
        }
    })?;

    Ok(Table {
        keyspace: keyspace.to_owned(),
        name: name.to_owned(),
        clustering_order: clustering_key.iter().map(|c| c.order).collect(),
        partition_key,
        clustering_key,
        columns,
        options: TableOptions::default(),
        id: None,
        indexes: Vec::new(),
        triggers: Vec::new(),
    })
}

fn build_indexes(
    tables: &SchemaTables,
    keyspace: &str,
    table: &str,
    rows: &[Row],
) -> Result<Vec<Index>, MetadataError> {
    let indexes_table = tables.indexes.unwrap_or_default();

    rows.iter()
        .map(|row| -> Result<_, MetadataError> {
            let name = row.text("index_name").with_table(indexes_table)?.to_owned();
            let kind_name = row.text("kind").with_table(indexes_table)?;
            let options = row.string_map("options").with_table(indexes_table)?;

            let kind = IndexKind::from_schema_name(kind_name).unwrap_or_else(|| {
                warn!(
                    keyspace,
                    table,
                    index = %name,
                    kind = kind_name,
                    "Unknown index kind, assuming a custom index"
                );
                IndexKind::Custom
            });
            let target = options
                .get("target")
                .map(|target| target.replace('"', ""))
                .unwrap_or_default();

            Ok(Index {
                name,
                kind,
                target,
                options,
            })
        })
        .collect()
}

pub(super) fn table_options(
    generation: &Generation,
    row: &Row,
    compact_storage: bool,
) -> Result<TableOptions, MetadataError> {
    native_options(generation.tables.tables, row, compact_storage)
}

fn native_options(
    source: &'static str,
    row: &Row,
    compact_storage: bool,
) -> Result<TableOptions, MetadataError> {
    let mut compaction = row.string_map("compaction").with_table(source)?;
    let compaction_class = compaction
        .remove("class")
        .map(|class| strip_package(&class, COMPACTION_PACKAGE_PREFIX))
        .unwrap_or_default();

    let mut compression = row.string_map("compression").with_table(source)?;
    if let Some(class) = compression.get_mut("class") {
        *class = strip_package(class, COMPRESSION_PACKAGE_PREFIX);
    }

    let caching = row.string_map("caching").with_table(source)?;
    let caching = if caching.is_empty() {
        None
    } else {
        serde_json::to_string(&caching.into_iter().collect::<BTreeMap<_, _>>()).ok()
    };

    Ok(TableOptions {
        comment: row.opt_text("comment").with_table(source)?.map(str::to_owned),
        read_repair_chance: row.opt_double("read_repair_chance").with_table(source)?,
        local_read_repair_chance: row
            .opt_double("dclocal_read_repair_chance")
            .with_table(source)?,
        gc_grace_seconds: row.opt_int("gc_grace_seconds").with_table(source)?,
        caching,
        bloom_filter_fp_chance: row.opt_double("bloom_filter_fp_chance").with_table(source)?,
        populate_io_cache_on_flush: None,
        memtable_flush_period_in_ms: row
            .opt_int("memtable_flush_period_in_ms")
            .with_table(source)?,
        default_time_to_live: row.opt_int("default_time_to_live").with_table(source)?,
        speculative_retry: row
            .opt_text("speculative_retry")
            .with_table(source)?
            .map(str::to_owned),
        index_interval: None,
        replicate_on_write: None,
        min_index_interval: row.opt_int("min_index_interval").with_table(source)?,
        max_index_interval: row.opt_int("max_index_interval").with_table(source)?,
        crc_check_chance: Some(
            row.opt_double("crc_check_chance")
                .with_table(source)?
                .unwrap_or(1.0),
        ),
        compaction: Compaction::new(compaction_class, compaction),
        compression,
        compact_storage,
    })
}
