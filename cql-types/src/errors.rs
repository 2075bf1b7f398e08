//! Errors returned by the type-string parsers.

use thiserror::Error;

/// Failed to parse a type string reported by the server.
///
/// Positions are 1-based and counted in characters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TypeParseError {
    /// A closing delimiter or a separator appeared at the top level,
    /// i.e. outside of any parameter list.
    #[error("Unbalanced delimiter {delimiter:?} at position {position} in type string {typ:?}")]
    UnbalancedDelimiter {
        typ: String,
        delimiter: char,
        position: usize,
    },

    /// The input ended while a parameter list was still open.
    #[error("Type string {typ:?} ends with {open} unclosed parameter list(s)")]
    UnclosedDelimiter { typ: String, open: usize },

    /// A quoted class name is missing its closing quote.
    #[error("Unterminated quoted class name in type string {0:?}")]
    UnterminatedQuote(String),

    /// A type name (or a type parameter) was empty.
    #[error("Empty type name in type string {0:?}")]
    EmptyTypeName(String),

    /// A parametrized type received a wrong number of parameters.
    #[error("Type {name} expects {expected} parameter(s), got {actual}")]
    InvalidParameterCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The dimension count of a vector type is not a number in the `u16` range.
    #[error("Invalid vector dimensions {0:?}")]
    InvalidVectorDimensions(String),

    /// A hex-encoded name in a class-name type string is not valid hex.
    #[error("Bad hex string: {0}")]
    BadHexString(String),

    /// A hex-encoded name decoded to bytes that are not valid UTF-8.
    #[error("Hex-encoded name is not valid UTF-8: {0:?}")]
    InvalidUtf8(Vec<u8>),

    /// A `name:Type` pair in a class-name type string lacks the colon.
    #[error("Expected a `name:type` pair, got {0:?}")]
    MissingFieldSeparator(String),
}
