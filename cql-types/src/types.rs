//! Resolved CQL types, as produced by the type-string parsers.

use std::fmt;

use itertools::Itertools as _;

/// A CQL type.
///
/// Every variant owns its element types. User defined types referenced by
/// other types are embedded as fully resolved copies, there is no sharing
/// and no way to form a cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColumnType {
    /// Types that are "simple" (non-recursive).
    Native(NativeType),

    /// Collection types: Lists, Sets, and Maps.
    Collection(CollectionType),

    /// A composite list-like type that has a defined size and all its elements
    /// can be of different types.
    Tuple(Vec<ColumnType>),

    /// A fixed-length sequence of elements of a single type.
    Vector {
        typ: Box<ColumnType>,
        dimensions: u16,
    },

    /// A user defined type, with its definition embedded.
    UserDefinedType(UserDefinedType),

    /// A type with no native mapping, identified by its server-side class name.
    Custom(String),
}

/// A [ColumnType] variants that are "simple" (non-recursive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NativeType {
    Ascii,
    Boolean,
    Blob,
    Counter,
    Date,
    Decimal,
    Double,
    Duration,
    Float,
    Int,
    BigInt,
    /// Also known as `varchar`.
    Text,
    Timestamp,
    Inet,
    SmallInt,
    TinyInt,
    Time,
    Timeuuid,
    Uuid,
    Varint,
}

/// Collection variants of [ColumnType].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CollectionType {
    List(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Set(Box<ColumnType>),
}

/// Definition of a user defined type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserDefinedType {
    pub keyspace: String,
    pub name: String,
    pub field_types: Vec<(String, ColumnType)>,
}

/// Sort order of a clustering column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClusteringOrder {
    #[default]
    Ascending,
    Descending,
}

impl NativeType {
    /// Looks up a native type by its CQL name.
    pub fn from_cql_name(name: &str) -> Option<Self> {
        let typ = match name {
            "ascii" => NativeType::Ascii,
            "boolean" => NativeType::Boolean,
            "blob" => NativeType::Blob,
            "counter" => NativeType::Counter,
            "date" => NativeType::Date,
            "decimal" => NativeType::Decimal,
            "double" => NativeType::Double,
            "duration" => NativeType::Duration,
            "float" => NativeType::Float,
            "int" => NativeType::Int,
            "bigint" => NativeType::BigInt,
            "text" | "varchar" => NativeType::Text,
            "timestamp" => NativeType::Timestamp,
            "inet" => NativeType::Inet,
            "smallint" => NativeType::SmallInt,
            "tinyint" => NativeType::TinyInt,
            "time" => NativeType::Time,
            "timeuuid" => NativeType::Timeuuid,
            "uuid" => NativeType::Uuid,
            "varint" => NativeType::Varint,
            _ => return None,
        };
        Some(typ)
    }

    /// The canonical CQL name of this type.
    pub fn cql_name(&self) -> &'static str {
        match self {
            NativeType::Ascii => "ascii",
            NativeType::Boolean => "boolean",
            NativeType::Blob => "blob",
            NativeType::Counter => "counter",
            NativeType::Date => "date",
            NativeType::Decimal => "decimal",
            NativeType::Double => "double",
            NativeType::Duration => "duration",
            NativeType::Float => "float",
            NativeType::Int => "int",
            NativeType::BigInt => "bigint",
            NativeType::Text => "text",
            NativeType::Timestamp => "timestamp",
            NativeType::Inet => "inet",
            NativeType::SmallInt => "smallint",
            NativeType::TinyInt => "tinyint",
            NativeType::Time => "time",
            NativeType::Timeuuid => "timeuuid",
            NativeType::Uuid => "uuid",
            NativeType::Varint => "varint",
        }
    }
}

impl ColumnType {
    pub fn list(element: ColumnType) -> Self {
        ColumnType::Collection(CollectionType::List(Box::new(element)))
    }

    pub fn set(element: ColumnType) -> Self {
        ColumnType::Collection(CollectionType::Set(Box::new(element)))
    }

    pub fn map(key: ColumnType, value: ColumnType) -> Self {
        ColumnType::Collection(CollectionType::Map(Box::new(key), Box::new(value)))
    }

    pub fn vector(element: ColumnType, dimensions: u16) -> Self {
        ColumnType::Vector {
            typ: Box::new(element),
            dimensions,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ColumnType::Collection(_))
    }
}

impl From<NativeType> for ColumnType {
    fn from(native: NativeType) -> Self {
        ColumnType::Native(native)
    }
}

impl From<UserDefinedType> for ColumnType {
    fn from(udt: UserDefinedType) -> Self {
        ColumnType::UserDefinedType(udt)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

/// Renders the canonical CQL form, e.g. `map<text, list<int>>`.
///
/// Frozenness is a property of the column, not of the type, so it is not rendered.
impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Native(native) => write!(f, "{native}"),
            ColumnType::Collection(CollectionType::List(element)) => write!(f, "list<{element}>"),
            ColumnType::Collection(CollectionType::Set(element)) => write!(f, "set<{element}>"),
            ColumnType::Collection(CollectionType::Map(key, value)) => {
                write!(f, "map<{key}, {value}>")
            }
            ColumnType::Tuple(elements) => write!(f, "tuple<{}>", elements.iter().format(", ")),
            ColumnType::Vector { typ, dimensions } => write!(f, "vector<{typ}, {dimensions}>"),
            ColumnType::UserDefinedType(udt) => f.write_str(&udt.name),
            ColumnType::Custom(class_name) => write!(f, "'{class_name}'"),
        }
    }
}

impl UserDefinedType {
    /// Returns the type of the field with given name, if present.
    pub fn field_type(&self, field_name: &str) -> Option<&ColumnType> {
        self.field_types
            .iter()
            .find_map(|(name, typ)| (name == field_name).then_some(typ))
    }
}
