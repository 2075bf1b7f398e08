//! Schema stored in the `system.schema_*` tables of 1.2 to 2.2 servers.
//!
//! Types are class names, options are JSON documents and indexes are
//! described inline on the column rows.

use std::collections::HashMap;

use cql_types::{ClassNameParseResult, ColumnType, NativeType, ParsedComponent};
use serde_json::Value;
use tracing::warn;

use super::{
    strip_package, table_options as build_options, validate_key_columns, Generation, RowResultExt,
    SchemaTables, TableRows, TypeContext, COMPACTION_PACKAGE_PREFIX, COMPRESSION_PACKAGE_PREFIX,
    REPLICATION_PACKAGE_PREFIX,
};
use crate::cluster::metadata::{
    Column, ColumnKind, Compaction, Index, IndexKind, Replication, Table, TableOptions, Trigger,
};
use crate::connection::Row;
use crate::errors::{KeyspacesMetadataError, MetadataError, TablesMetadataError};

pub(super) fn replication(
    tables: &SchemaTables,
    keyspace: &str,
    row: &Row,
) -> Result<Replication, MetadataError> {
    let class = row
        .opt_text("strategy_class")
        .with_table(tables.keyspaces)?
        .ok_or_else(|| KeyspacesMetadataError::MissingReplicationClass {
            keyspace: keyspace.to_owned(),
        })?;
    let options = json_string_map(row.opt_text("strategy_options").with_table(tables.keyspaces)?)
        .map_err(|reason| KeyspacesMetadataError::InvalidJson {
            keyspace: keyspace.to_owned(),
            option: "strategy_options",
            reason,
        })?;

    Ok(Replication::new(
        strip_package(class, REPLICATION_PACKAGE_PREFIX),
        options,
    ))
}

/// Identifies the table being built in errors.
struct TableContext<'a> {
    generation: &'a Generation,
    keyspace: &'a str,
    table: &'a str,
    types: TypeContext<'a>,
}

impl TableContext<'_> {
    fn parse(&self, column: &str, typ: &str) -> Result<ParsedComponent, TablesMetadataError> {
        self.types
            .table_column(self.keyspace, self.table, column, typ)
    }

    fn parse_composite(
        &self,
        option: &str,
        typ: &str,
    ) -> Result<ClassNameParseResult, TablesMetadataError> {
        cql_types::parse_class_name(typ).map_err(|error| TablesMetadataError::InvalidCqlType {
            keyspace: self.keyspace.to_owned(),
            table: self.table.to_owned(),
            column: option.to_owned(),
            typ: typ.to_owned(),
            error,
        })
    }

    fn invalid_json(&self, option: &'static str, reason: String) -> TablesMetadataError {
        TablesMetadataError::InvalidJson {
            keyspace: self.keyspace.to_owned(),
            table: self.table.to_owned(),
            option,
            reason,
        }
    }

    fn columns_table(&self) -> &'static str {
        self.generation.tables.columns
    }

    fn tables_table(&self) -> &'static str {
        self.generation.tables.tables
    }

    /// Builds a column from a `schema_columns` row, with its inline index.
    fn column(&self, row: &Row) -> Result<(Column, Option<Index>), MetadataError> {
        let name = row.text("column_name").with_table(self.columns_table())?;
        let validator = row.text("validator").with_table(self.columns_table())?;
        let parsed = self.parse(name, validator)?;
        let is_static = row
            .opt_text("type")
            .with_table(self.columns_table())?
            .is_some_and(|kind| kind.eq_ignore_ascii_case("static"));

        let column = Column {
            name: name.to_owned(),
            typ: parsed.typ,
            order: parsed.order,
            frozen: parsed.frozen,
            is_static,
        };
        let index = self.inline_index(row, &column)?;

        Ok((column, index))
    }

    fn inline_index(&self, row: &Row, column: &Column) -> Result<Option<Index>, MetadataError> {
        let Some(index_type) = row.opt_text("index_type").with_table(self.columns_table())? else {
            return Ok(None);
        };

        let name = row
            .opt_text("index_name")
            .with_table(self.columns_table())?
            .unwrap_or_default()
            .to_owned();
        let options =
            json_string_map(row.opt_text("index_options").with_table(self.columns_table())?)
                .map_err(|reason| self.invalid_json("index_options", reason))?;
        let kind = IndexKind::from_schema_name(index_type).unwrap_or_else(|| {
            warn!(
                keyspace = self.keyspace,
                table = self.table,
                index = %name,
                index_type,
                "Unknown index type, assuming a custom index"
            );
            IndexKind::Custom
        });

        let target = if options.contains_key("index_keys") {
            format!("keys({})", column.name)
        } else if options.contains_key("index_keys_and_values") {
            format!("entries({})", column.name)
        } else if column.frozen && column.typ.is_collection() {
            format!("full({})", column.name)
        } else {
            column.name.clone()
        };

        Ok(Some(Index {
            name,
            kind,
            target,
            options,
        }))
    }

    fn triggers(&self, rows: &[Row]) -> Result<Vec<Trigger>, MetadataError> {
        let table = self.generation.tables.triggers.unwrap_or_default();
        rows.iter()
            .map(|row| -> Result<_, MetadataError> {
                Ok(Trigger {
                    name: row.text("trigger_name").with_table(table)?.to_owned(),
                    options: row.string_map("trigger_options").with_table(table)?,
                })
            })
            .collect()
    }

    fn finish(
        &self,
        row: &Row,
        keys: KeyColumns,
        regular: Vec<(Column, Option<Index>)>,
        triggers: Vec<Trigger>,
        compact_storage: bool,
    ) -> Result<Table, MetadataError> {
        let mut columns = HashMap::with_capacity(regular.len());
        let mut indexes = Vec::new();
        for (column, index) in regular {
            indexes.extend(index);
            columns.insert(column.name.clone(), column);
        }

        Ok(Table {
            keyspace: self.keyspace.to_owned(),
            name: self.table.to_owned(),
            clustering_order: keys.clustering_key.iter().map(|c| c.order).collect(),
            partition_key: keys.partition_key,
            clustering_key: keys.clustering_key,
            columns,
            options: build_options(
                self.generation,
                self.keyspace,
                self.table,
                row,
                compact_storage,
            )?,
            id: row.opt_uuid("cf_id").with_table(self.tables_table())?,
            indexes,
            triggers,
        })
    }
}

struct KeyColumns {
    partition_key: Vec<Column>,
    clustering_key: Vec<Column>,
}

/// Builds a table whose key columns are only known from the comparator
/// and the alias lists.
pub(super) fn build_comparator_table(
    generation: &Generation,
    keyspace: &str,
    row: &Row,
    rows: TableRows,
    types: TypeContext<'_>,
) -> Result<Table, MetadataError> {
    let tables_table = generation.tables.tables;
    let table = row
        .text(generation.tables.table_name_column)
        .with_table(tables_table)?;
    let ctx = TableContext {
        generation,
        keyspace,
        table,
        types,
    };

    let key_validator = ctx.parse_composite(
        "key_validator",
        row.text("key_validator").with_table(tables_table)?,
    )?;
    let comparator = ctx.parse_composite(
        "comparator",
        row.text("comparator").with_table(tables_table)?,
    )?;
    let key_aliases = json_string_list(row.opt_text("key_aliases").with_table(tables_table)?)
        .map_err(|reason| ctx.invalid_json("key_aliases", reason))?;
    let column_aliases =
        json_string_list(row.opt_text("column_aliases").with_table(tables_table)?)
            .map_err(|reason| ctx.invalid_json("column_aliases", reason))?;

    let column_rows: Vec<&Row> = rows
        .columns
        .iter()
        .filter(|row| {
            row.opt_text("column_name")
                .ok()
                .flatten()
                .is_some_and(|name| !name.is_empty())
        })
        .collect();

    let size = comparator.components.len();
    let shape = match &comparator.collections {
        // The last component names the regular column.
        Some(collections) if !collections.is_empty() => ComparatorShape {
            compact_storage: false,
            has_value: false,
            clustering_size: size.saturating_sub(1),
        },
        Some(_)
            if size.checked_sub(1) == Some(column_aliases.len())
                && comparator
                    .components
                    .last()
                    .is_some_and(|c| c.typ == ColumnType::Native(NativeType::Text)) =>
        {
            ComparatorShape {
                compact_storage: false,
                has_value: false,
                clustering_size: size - 1,
            }
        }
        Some(_) => ComparatorShape {
            compact_storage: true,
            has_value: !column_aliases.is_empty() || column_rows.is_empty(),
            clustering_size: size,
        },
        None if !column_aliases.is_empty() || column_rows.is_empty() => ComparatorShape {
            compact_storage: true,
            has_value: true,
            clustering_size: size,
        },
        None => ComparatorShape {
            compact_storage: true,
            has_value: false,
            clustering_size: 0,
        },
    };

    let partition_key = key_validator
        .components
        .into_iter()
        .enumerate()
        .map(|(i, component)| {
            let name = key_aliases.get(i).cloned().unwrap_or_else(|| match i {
                0 => "key".to_owned(),
                _ => format!("key{}", i + 1),
            });
            key_column(name, component)
        })
        .collect();

    let clustering_key = comparator
        .components
        .into_iter()
        .take(shape.clustering_size)
        .enumerate()
        .map(|(i, component)| {
            let name = column_aliases
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("column{}", i + 1));
            key_column(name, component)
        })
        .collect();

    let mut regular = Vec::with_capacity(column_rows.len() + 1);
    if shape.has_value {
        let value_alias = row
            .opt_text("value_alias")
            .with_table(tables_table)?
            .unwrap_or("value");
        if !value_alias.is_empty() {
            let validator = row.text("default_validator").with_table(tables_table)?;
            let parsed = ctx.parse(value_alias, validator)?;
            regular.push((key_column(value_alias.to_owned(), parsed), None));
        }
    }
    for column_row in column_rows {
        regular.push(ctx.column(column_row)?);
    }

    let triggers = ctx.triggers(&rows.triggers)?;
    ctx.finish(
        row,
        KeyColumns {
            partition_key,
            clustering_key,
        },
        regular,
        triggers,
        shape.compact_storage,
    )
}

struct ComparatorShape {
    compact_storage: bool,
    has_value: bool,
    clustering_size: usize,
}

fn key_column(name: String, component: ParsedComponent) -> Column {
    Column {
        name,
        typ: component.typ,
        order: component.order,
        frozen: component.frozen,
        is_static: false,
    }
}

/// Builds a table whose column rows carry their kind and position.
pub(super) fn build_component_index_table(
    generation: &Generation,
    keyspace: &str,
    row: &Row,
    rows: TableRows,
    types: TypeContext<'_>,
) -> Result<Table, MetadataError> {
    let tables_table = generation.tables.tables;
    let columns_table = generation.tables.columns;
    let table = row
        .text(generation.tables.table_name_column)
        .with_table(tables_table)?;
    let ctx = TableContext {
        generation,
        keyspace,
        table,
        types,
    };
    let comparator = ctx.parse_composite(
        "comparator",
        row.text("comparator").with_table(tables_table)?,
    )?;

    let mut partition_key = Vec::new();
    let mut clustering_key = Vec::new();
    let mut regular = Vec::with_capacity(rows.columns.len());

    for column_row in rows.columns.iter() {
        let name = column_row.text("column_name").with_table(columns_table)?;
        if name.is_empty() {
            continue;
        }

        let kind_name = column_row
            .opt_text("type")
            .with_table(columns_table)?
            .unwrap_or("regular");
        let kind: ColumnKind = kind_name.parse().map_err(|_| {
            TablesMetadataError::UnknownColumnKind {
                keyspace_name: keyspace.to_owned(),
                table_name: table.to_owned(),
                column_name: name.to_owned(),
                column_kind: kind_name.to_owned(),
            }
        })?;
        let position = column_row
            .opt_int("component_index")
            .with_table(columns_table)?
            .unwrap_or(0);

        let (column, index) = ctx.column(column_row)?;
        match kind {
            ColumnKind::PartitionKey => partition_key.push((position, column)),
            ColumnKind::Clustering => clustering_key.push((position, column)),
            _ => regular.push((column, index)),
        }
    }

    let partition_key = validate_key_columns(partition_key).map_err(|position| {
        TablesMetadataError::IncompletePartitionKey {
            keyspace: keyspace.to_owned(),
            table: table.to_owned(),
            position,
        }
    })?;
    let clustering_key = validate_key_columns(clustering_key).map_err(|position| {
        TablesMetadataError::IncompleteClusteringKey {
            keyspace: keyspace.to_owned(),
            table: table.to_owned(),
            position,
        }
    })?;

    // A non-compact table has one comparator component per clustering
    // column plus the one naming the regular column.
    let compact_storage = !comparator.is_composite()
        || comparator.components.len().checked_sub(1) != Some(clustering_key.len());

    let triggers = ctx.triggers(&rows.triggers)?;
    ctx.finish(
        row,
        KeyColumns {
            partition_key,
            clustering_key,
        },
        regular,
        triggers,
        compact_storage,
    )
}

pub(super) fn table_options(
    generation: &Generation,
    keyspace: &str,
    table: &str,
    row: &Row,
    compact_storage: bool,
) -> Result<TableOptions, MetadataError> {
    let t = generation.tables.tables;
    let invalid_json = |option: &'static str, reason: String| TablesMetadataError::InvalidJson {
        keyspace: keyspace.to_owned(),
        table: table.to_owned(),
        option,
        reason,
    };

    let compaction_class = row
        .opt_text("compaction_strategy_class")
        .with_table(t)?
        .map(|class| strip_package(class, COMPACTION_PACKAGE_PREFIX))
        .unwrap_or_default();
    let compaction_options =
        json_string_map(row.opt_text("compaction_strategy_options").with_table(t)?)
            .map_err(|reason| invalid_json("compaction_strategy_options", reason))?;

    let mut compression = json_string_map(row.opt_text("compression_parameters").with_table(t)?)
        .map_err(|reason| invalid_json("compression_parameters", reason))?;
    if let Some(class) = compression.get_mut("sstable_compression") {
        *class = strip_package(class, COMPRESSION_PACKAGE_PREFIX);
    }

    Ok(TableOptions {
        comment: row.opt_text("comment").with_table(t)?.map(str::to_owned),
        read_repair_chance: row.opt_double("read_repair_chance").with_table(t)?,
        local_read_repair_chance: row.opt_double("local_read_repair_chance").with_table(t)?,
        gc_grace_seconds: row.opt_int("gc_grace_seconds").with_table(t)?,
        caching: row.opt_text("caching").with_table(t)?.map(str::to_owned),
        bloom_filter_fp_chance: row
            .opt_double("bloom_filter_fp_chance")
            .with_table(t)?
            .or(generation.default_bloom_filter_fp_chance),
        populate_io_cache_on_flush: row.opt_boolean("populate_io_cache_on_flush").with_table(t)?,
        memtable_flush_period_in_ms: row.opt_int("memtable_flush_period_in_ms").with_table(t)?,
        default_time_to_live: row.opt_int("default_time_to_live").with_table(t)?,
        speculative_retry: row.opt_text("speculative_retry").with_table(t)?.map(str::to_owned),
        index_interval: row.opt_int("index_interval").with_table(t)?,
        replicate_on_write: row.opt_boolean("replicate_on_write").with_table(t)?,
        min_index_interval: row.opt_int("min_index_interval").with_table(t)?,
        max_index_interval: row.opt_int("max_index_interval").with_table(t)?,
        crc_check_chance: None,
        compaction: Compaction::new(compaction_class, compaction_options),
        compression,
        compact_storage,
    })
}

/// Decodes a JSON object of options; null or absent decodes as empty.
///
/// Non-string values are kept in their JSON form.
fn json_string_map(json: Option<&str>) -> Result<HashMap<String, String>, String> {
    let Some(json) = json else {
        return Ok(HashMap::new());
    };

    match serde_json::from_str::<Value>(json).map_err(|err| err.to_string())? {
        Value::Null => Ok(HashMap::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, json_scalar(value)))
            .collect()),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

/// Decodes a JSON array of names; null or absent decodes as empty.
fn json_string_list(json: Option<&str>) -> Result<Vec<String>, String> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<Value>(json).map_err(|err| err.to_string())? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.into_iter().map(json_scalar).collect()),
        other => Err(format!("expected a JSON array, got {other}")),
    }
}

fn json_scalar(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
