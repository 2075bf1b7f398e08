//! Resolver for the CQL type grammar (`frozen<map<text, list<int>>>`).

use std::collections::HashMap;

use super::{parse, GrammarProfile, NodeId, TypeTree};
use crate::errors::TypeParseError;
use crate::types::{ColumnType, NativeType, UserDefinedType};

/// Class name reported for the type of surrogate columns of dense tables.
pub const EMPTY_TYPE_CLASS: &str = "org.apache.cassandra.db.marshal.EmptyType";

/// User defined types known so far, by name, within a single keyspace.
pub type UdtLookup = HashMap<String, UserDefinedType>;

/// Outcome of resolving a CQL type string against a set of known UDTs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeResolution {
    /// The type was fully resolved.
    Resolved { typ: ColumnType, frozen: bool },
    /// The type refers to a user defined type that is not (yet) known.
    /// Resolution can be retried once `missing` has been resolved.
    Deferred { missing: String },
}

impl TypeResolution {
    /// Returns the resolved type and frozenness, or the name of the missing UDT.
    pub fn into_result(self) -> Result<(ColumnType, bool), String> {
        match self {
            TypeResolution::Resolved { typ, frozen } => Ok((typ, frozen)),
            TypeResolution::Deferred { missing } => Err(missing),
        }
    }
}

/// Parses a type string in the CQL grammar.
///
/// A top-level `frozen<...>` is stripped and reported through the `frozen`
/// flag; nested `frozen<...>` wrappers are transparent. Names that are
/// neither native nor collection types are looked up in `udts`; when such a
/// lookup fails, [TypeResolution::Deferred] is returned instead of an error
/// so that the caller can retry after resolving more types.
pub fn parse_cql_type(input: &str, udts: &UdtLookup) -> Result<TypeResolution, TypeParseError> {
    let tree = parse(input, GrammarProfile::Angle)?;
    let resolver = CqlTypeResolver {
        tree: &tree,
        udts,
        input,
    };

    let mut root = TypeTree::ROOT;
    let mut frozen = false;
    if tree.name(root) == "frozen" {
        root = resolver.single_child("frozen", root)?;
        frozen = true;
    }

    match resolver.lookup(root) {
        Ok(typ) => Ok(TypeResolution::Resolved { typ, frozen }),
        Err(ResolveError::Missing(missing)) => Ok(TypeResolution::Deferred { missing }),
        Err(ResolveError::Invalid(err)) => Err(err),
    }
}

enum ResolveError {
    Missing(String),
    Invalid(TypeParseError),
}

impl From<TypeParseError> for ResolveError {
    fn from(err: TypeParseError) -> Self {
        ResolveError::Invalid(err)
    }
}

struct CqlTypeResolver<'a> {
    tree: &'a TypeTree,
    udts: &'a UdtLookup,
    input: &'a str,
}

impl CqlTypeResolver<'_> {
    fn params<const N: usize>(
        &self,
        name: &str,
        id: NodeId,
    ) -> Result<[NodeId; N], TypeParseError> {
        let children = self.tree.children(id);
        children
            .try_into()
            .map_err(|_| TypeParseError::InvalidParameterCount {
                name: name.to_owned(),
                expected: N,
                actual: children.len(),
            })
    }

    fn single_child(&self, name: &str, id: NodeId) -> Result<NodeId, TypeParseError> {
        let [child] = self.params::<1>(name, id)?;
        Ok(child)
    }

    fn lookup(&self, id: NodeId) -> Result<ColumnType, ResolveError> {
        let name = self.tree.name(id);
        let typ = match name {
            "" => return Err(TypeParseError::EmptyTypeName(self.input.to_owned()).into()),
            "frozen" => return self.lookup(self.single_child(name, id)?),
            "list" => ColumnType::list(self.lookup(self.single_child(name, id)?)?),
            "set" => ColumnType::set(self.lookup(self.single_child(name, id)?)?),
            "map" => {
                let [key, value] = self.params::<2>(name, id)?;
                ColumnType::map(self.lookup(key)?, self.lookup(value)?)
            }
            "tuple" => {
                let children = self.tree.children(id);
                if children.is_empty() {
                    return Err(TypeParseError::InvalidParameterCount {
                        name: name.to_owned(),
                        expected: 1,
                        actual: 0,
                    }
                    .into());
                }
                ColumnType::Tuple(
                    children
                        .iter()
                        .map(|child| self.lookup(*child))
                        .collect::<Result<_, _>>()?,
                )
            }
            "vector" => {
                let [element, dimensions] = self.params::<2>(name, id)?;
                ColumnType::vector(self.lookup(element)?, self.tree.dimensions(dimensions)?)
            }
            "empty" => ColumnType::Custom(EMPTY_TYPE_CLASS.to_owned()),
            custom if custom.starts_with('\'') => {
                let class_name = custom.trim_start_matches('\'');
                let class_name = class_name.strip_suffix('\'').unwrap_or(class_name);
                ColumnType::Custom(class_name.to_owned())
            }
            other => match NativeType::from_cql_name(other) {
                Some(native) => {
                    self.params::<0>(name, id)?;
                    ColumnType::Native(native)
                }
                None => match self.udts.get(other) {
                    Some(udt) => ColumnType::UserDefinedType(udt.clone()),
                    None => return Err(ResolveError::Missing(other.to_owned())),
                },
            },
        };
        Ok(typ)
    }
}
