//! Resolution of user defined types that refer to each other.
//!
//! Schema tables list the types of a keyspace in no particular order, and a
//! field may refer to a type that is listed later. Types are therefore
//! resolved with a worklist: a type whose fields refer to a not yet resolved
//! type is put aside and retried in the next pass. A pass that puts every
//! remaining type aside means the remaining types can never be resolved.

use std::collections::HashMap;
use std::time::Instant;

use cql_types::{TypeParseError, TypeResolution, UdtLookup, UserDefinedType};
use tracing::debug;

use crate::errors::UdtMetadataError;

/// A user defined type as read from a schema table, fields not yet resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawUserType {
    pub name: String,
    pub field_names: Vec<String>,
    pub field_types: Vec<String>,
}

/// Resolves all user defined types of `keyspace`.
///
/// `resolve_field` turns a single field type string into a
/// [TypeResolution], given the types resolved so far. It is called again
/// for every field of a type whose resolution was deferred.
pub fn resolve_user_types<F>(
    keyspace: &str,
    rows: Vec<RawUserType>,
    mut resolve_field: F,
) -> Result<UdtLookup, UdtMetadataError>
where
    F: FnMut(&str, &UdtLookup) -> Result<TypeResolution, TypeParseError>,
{
    let started = Instant::now();
    let total = rows.len();

    for row in rows.iter() {
        if row.field_names.len() != row.field_types.len() {
            return Err(UdtMetadataError::FieldCountMismatch {
                keyspace: keyspace.to_owned(),
                type_name: row.name.clone(),
                names: row.field_names.len(),
                types: row.field_types.len(),
            });
        }
    }

    let mut resolved: UdtLookup = HashMap::with_capacity(total);
    let mut pending = rows;
    let mut passes = 0usize;

    while !pending.is_empty() {
        passes += 1;
        let pass_size = pending.len();
        let mut skipped = Vec::new();

        for row in pending {
            match resolve_row(keyspace, &row, &resolved, &mut resolve_field)? {
                Some(udt) => {
                    resolved.insert(udt.name.clone(), udt);
                }
                None => skipped.push(row),
            }
        }

        if skipped.len() == pass_size {
            let mut type_names: Vec<String> = skipped.into_iter().map(|row| row.name).collect();
            type_names.sort();
            debug!(
                keyspace,
                ?type_names,
                passes,
                "Unable to make progress resolving user defined types"
            );
            return Err(UdtMetadataError::CircularTypeDependency {
                keyspace: keyspace.to_owned(),
                type_names,
            });
        }

        pending = skipped;
    }

    debug!(
        keyspace,
        types = total,
        passes,
        elapsed = ?started.elapsed(),
        "Resolved user defined types"
    );

    Ok(resolved)
}

/// Returns `None` when some field refers to a type that is not resolved yet.
fn resolve_row<F>(
    keyspace: &str,
    row: &RawUserType,
    resolved: &UdtLookup,
    resolve_field: &mut F,
) -> Result<Option<UserDefinedType>, UdtMetadataError>
where
    F: FnMut(&str, &UdtLookup) -> Result<TypeResolution, TypeParseError>,
{
    let mut field_types = Vec::with_capacity(row.field_types.len());

    for (field_name, field_type) in row.field_names.iter().zip(row.field_types.iter()) {
        let resolution = resolve_field(field_type, resolved).map_err(|error| {
            UdtMetadataError::InvalidCqlType {
                keyspace: keyspace.to_owned(),
                type_name: row.name.clone(),
                typ: field_type.clone(),
                error,
            }
        })?;

        match resolution {
            TypeResolution::Resolved { typ, .. } => field_types.push((field_name.clone(), typ)),
            TypeResolution::Deferred { .. } => return Ok(None),
        }
    }

    Ok(Some(UserDefinedType {
        keyspace: keyspace.to_owned(),
        name: row.name.clone(),
        field_types,
    }))
}
