//! Defines the CQL type model and the parsers for the two textual type
//! encodings reported by Cassandra-family servers in their schema tables:
//!
//! - the CQL grammar with angle-bracket nesting (`map<text, frozen<list<int>>>`),
//!   see [parse_cql_type],
//! - the fully-qualified class-name grammar with parenthesis nesting used by
//!   older servers (`org.apache.cassandra.db.marshal.MapType(...)`),
//!   see [parse_class_name].
//!
//! Mainly intended to be used by the `cql-schema` crate, but the parsers are
//! self-contained and can be reused by anything that needs to interpret
//! type strings coming from the server.

pub mod errors;
pub mod types;
pub mod value;

pub mod type_parser;

pub(crate) mod utils;

pub use errors::TypeParseError;
pub use type_parser::class_name::{parse_class_name, ClassNameParseResult, ParsedComponent};
pub use type_parser::cql::{parse_cql_type, TypeResolution, UdtLookup};
pub use types::{ClusteringOrder, CollectionType, ColumnType, NativeType, UserDefinedType};
pub use value::CqlValue;
