//! Resolver for the class-name type grammar used by legacy schema tables,
//! e.g. `org.apache.cassandra.db.marshal.MapType(org.apache.cassandra.db.marshal.UTF8Type,...)`.

use std::collections::HashMap;

use super::{parse, GrammarProfile, NodeId, TypeTree};
use crate::errors::TypeParseError;
use crate::types::{ClusteringOrder, ColumnType, NativeType, UserDefinedType};

const MARSHAL_PREFIX: &str = "org.apache.cassandra.db.marshal.";

/// A single component of a parsed class name, together with the
/// modifiers that wrapped it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedComponent {
    pub typ: ColumnType,
    pub order: ClusteringOrder,
    pub frozen: bool,
}

/// Result of parsing a class-name type string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNameParseResult {
    /// One entry for a plain type, one per component for a `CompositeType`.
    pub components: Vec<ParsedComponent>,
    /// Present only for a `CompositeType`: collection columns declared by a
    /// trailing `ColumnToCollectionType`, keyed by column name.
    pub collections: Option<HashMap<String, ColumnType>>,
}

impl ClassNameParseResult {
    pub fn is_composite(&self) -> bool {
        self.collections.is_some()
    }

    /// Returns the first component. Useful for type strings that are known
    /// not to be composite, such as validators.
    pub fn into_first(self) -> Option<ParsedComponent> {
        self.components.into_iter().next()
    }
}

/// Parses a type string in the class-name grammar.
///
/// Class names outside of the `org.apache.cassandra.db.marshal` package, or
/// unknown within it, resolve to [ColumnType::Custom] holding the full
/// serialized subtree.
pub fn parse_class_name(input: &str) -> Result<ClassNameParseResult, TypeParseError> {
    let tree = parse(input, GrammarProfile::Paren)?;
    let resolver = ClassNameResolver { tree: &tree };
    let root = TypeTree::ROOT;

    if marshal_name(tree.name(root)) != Some("CompositeType") {
        return Ok(ClassNameParseResult {
            components: vec![resolver.component(root)?],
            collections: None,
        });
    }

    let mut components = tree.children(root);
    let mut collections = HashMap::new();
    if let Some((last, rest)) = components.split_last() {
        if marshal_name(tree.name(*last)) == Some("ColumnToCollectionType") {
            for child in tree.children(*last) {
                let (column, class_name) = split_hex_prefixed(tree.name(*child))?;
                let component = resolver.component_as(class_name, *child)?;
                collections.insert(column, component.typ);
            }
            components = rest;
        }
    }

    Ok(ClassNameParseResult {
        components: components
            .iter()
            .map(|child| resolver.component(*child))
            .collect::<Result<_, _>>()?,
        collections: Some(collections),
    })
}

fn marshal_name(name: &str) -> Option<&str> {
    name.strip_prefix(MARSHAL_PREFIX)
}

fn decode_hex_name(hex_name: &str) -> Result<String, TypeParseError> {
    let bytes =
        hex::decode(hex_name).map_err(|_| TypeParseError::BadHexString(hex_name.to_owned()))?;
    String::from_utf8(bytes).map_err(|err| TypeParseError::InvalidUtf8(err.into_bytes()))
}

/// Splits `6e616d65:org.apache...` into the decoded name and the class name.
fn split_hex_prefixed(name: &str) -> Result<(String, &str), TypeParseError> {
    let (hex_name, class_name) = name
        .split_once(':')
        .ok_or_else(|| TypeParseError::MissingFieldSeparator(name.to_owned()))?;
    Ok((decode_hex_name(hex_name)?, class_name))
}

fn native_from_class_name(name: &str) -> Option<NativeType> {
    let native = match name {
        "AsciiType" => NativeType::Ascii,
        "BooleanType" => NativeType::Boolean,
        "BytesType" => NativeType::Blob,
        "ByteType" => NativeType::TinyInt,
        "CounterColumnType" => NativeType::Counter,
        "DateType" | "TimestampType" => NativeType::Timestamp,
        "DecimalType" => NativeType::Decimal,
        "DoubleType" => NativeType::Double,
        "DurationType" => NativeType::Duration,
        "FloatType" => NativeType::Float,
        "InetAddressType" => NativeType::Inet,
        "Int32Type" => NativeType::Int,
        "IntegerType" => NativeType::Varint,
        "LongType" => NativeType::BigInt,
        "ShortType" => NativeType::SmallInt,
        "SimpleDateType" => NativeType::Date,
        "TimeType" => NativeType::Time,
        "TimeUUIDType" => NativeType::Timeuuid,
        "UTF8Type" => NativeType::Text,
        "UUIDType" => NativeType::Uuid,
        _ => return None,
    };
    Some(native)
}

struct ClassNameResolver<'a> {
    tree: &'a TypeTree,
}

impl ClassNameResolver<'_> {
    fn single_child(&self, name: &str, id: NodeId) -> Result<NodeId, TypeParseError> {
        match self.tree.children(id) {
            [child] => Ok(*child),
            children => Err(TypeParseError::InvalidParameterCount {
                name: name.to_owned(),
                expected: 1,
                actual: children.len(),
            }),
        }
    }

    fn component(&self, id: NodeId) -> Result<ParsedComponent, TypeParseError> {
        self.component_as(self.tree.name(id), id)
    }

    /// Unwraps an outer `ReversedType` and then an outer `FrozenType`.
    fn component_as(&self, name: &str, id: NodeId) -> Result<ParsedComponent, TypeParseError> {
        let (mut name, mut id) = (name, id);
        let mut order = ClusteringOrder::Ascending;
        let mut frozen = false;

        if marshal_name(name) == Some("ReversedType") {
            id = self.single_child(name, id)?;
            name = self.tree.name(id);
            order = ClusteringOrder::Descending;
        }
        if marshal_name(name) == Some("FrozenType") {
            id = self.single_child(name, id)?;
            name = self.tree.name(id);
            frozen = true;
        }

        Ok(ParsedComponent {
            typ: self.lookup_as(name, id)?,
            order,
            frozen,
        })
    }

    fn lookup(&self, id: NodeId) -> Result<ColumnType, TypeParseError> {
        self.lookup_as(self.tree.name(id), id)
    }

    fn lookup_as(&self, name: &str, id: NodeId) -> Result<ColumnType, TypeParseError> {
        if name.is_empty() {
            return Err(TypeParseError::EmptyTypeName(self.tree.dump(TypeTree::ROOT)));
        }
        let Some(short_name) = marshal_name(name) else {
            return Ok(ColumnType::Custom(self.tree.dump_as(name, id)));
        };

        let children = self.tree.children(id);
        let typ = match short_name {
            "FrozenType" | "ReversedType" => self.lookup(self.single_child(name, id)?)?,
            "ListType" => ColumnType::list(self.lookup(self.single_child(name, id)?)?),
            "SetType" => ColumnType::set(self.lookup(self.single_child(name, id)?)?),
            "MapType" => match children {
                [key, value] => ColumnType::map(self.lookup(*key)?, self.lookup(*value)?),
                _ => {
                    return Err(TypeParseError::InvalidParameterCount {
                        name: name.to_owned(),
                        expected: 2,
                        actual: children.len(),
                    })
                }
            },
            "TupleType" => ColumnType::Tuple(
                children
                    .iter()
                    .map(|child| self.lookup(*child))
                    .collect::<Result<_, _>>()?,
            ),
            "VectorType" => match children {
                [element, dimensions] => {
                    ColumnType::vector(self.lookup(*element)?, self.tree.dimensions(*dimensions)?)
                }
                _ => {
                    return Err(TypeParseError::InvalidParameterCount {
                        name: name.to_owned(),
                        expected: 2,
                        actual: children.len(),
                    })
                }
            },
            "UserType" => self.user_type(name, children)?,
            other => match native_from_class_name(other) {
                Some(native) => ColumnType::Native(native),
                None => ColumnType::Custom(self.tree.dump_as(name, id)),
            },
        };
        Ok(typ)
    }

    /// `UserType(keyspace, hex(name), hex(field):Class, ...)`
    fn user_type(&self, name: &str, children: &[NodeId]) -> Result<ColumnType, TypeParseError> {
        let [keyspace, type_name, fields @ ..] = children else {
            return Err(TypeParseError::InvalidParameterCount {
                name: name.to_owned(),
                expected: 2,
                actual: children.len(),
            });
        };

        let field_types = fields
            .iter()
            .map(|field| -> Result<_, TypeParseError> {
                let (field_name, class_name) = split_hex_prefixed(self.tree.name(*field))?;
                Ok((field_name, self.lookup_as(class_name, *field)?))
            })
            .collect::<Result<_, _>>()?;

        Ok(ColumnType::UserDefinedType(UserDefinedType {
            keyspace: self.tree.name(*keyspace).to_owned(),
            name: decode_hex_name(self.tree.name(*type_name))?,
            field_types,
        }))
    }
}
