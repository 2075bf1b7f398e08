//! Tree builder shared by the two type grammars.
//!
//! A type string is scanned once, left to right, into a tree of
//! `(name, children)` nodes. The grammar profile decides which characters
//! open and close parameter lists. The resulting tree is then interpreted
//! by one of the resolvers: [cql] for the angle-bracket grammar and
//! [class_name] for the class-name grammar.

pub mod class_name;
pub mod cql;

use crate::errors::TypeParseError;
use crate::utils::parse::ParserState;

/// Delimiters of a type grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GrammarProfile {
    /// `map<text, frozen<list<int>>>`. A `"` inside a name is dropped.
    Angle,
    /// `org.apache.cassandra.db.marshal.MapType(...)`.
    Paren,
}

impl GrammarProfile {
    fn open(self) -> char {
        match self {
            GrammarProfile::Angle => '<',
            GrammarProfile::Paren => '(',
        }
    }

    fn close(self) -> char {
        match self {
            GrammarProfile::Angle => '>',
            GrammarProfile::Paren => ')',
        }
    }

    fn is_special(self, c: char) -> bool {
        c == self.open()
            || c == self.close()
            || c == ','
            || c.is_whitespace()
            || (self == GrammarProfile::Angle && c == '"')
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NodeId(usize);

#[derive(Debug)]
struct TypeNode {
    name: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// Parse tree of a type string, stored in an index-based arena.
///
/// Parents are referenced by index, so the tree holds no shared mutable
/// references. The tree lives only as long as a single resolution.
#[derive(Debug)]
pub(crate) struct TypeTree {
    nodes: Vec<TypeNode>,
}

impl TypeTree {
    pub(crate) const ROOT: NodeId = NodeId(0);

    fn new() -> Self {
        Self {
            nodes: vec![TypeNode {
                name: String::new(),
                children: Vec::new(),
                parent: None,
            }],
        }
    }

    fn push_child(&mut self, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TypeNode {
            name: String::new(),
            children: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Serializes a subtree back to the class-name notation, e.g. `Name(A,B(C))`.
    pub(crate) fn dump(&self, id: NodeId) -> String {
        self.dump_as(self.name(id), id)
    }

    /// Reads the dimension count of a vector type from a leaf node.
    pub(crate) fn dimensions(&self, id: NodeId) -> Result<u16, TypeParseError> {
        let name = self.name(id);
        if !self.children(id).is_empty() {
            return Err(TypeParseError::InvalidVectorDimensions(self.dump(id)));
        }
        name.parse()
            .map_err(|_| TypeParseError::InvalidVectorDimensions(name.to_owned()))
    }

    /// Like [TypeTree::dump], but renders `name` instead of the node's own name.
    pub(crate) fn dump_as(&self, name: &str, id: NodeId) -> String {
        let mut out = name.to_owned();
        let children = self.children(id);
        if !children.is_empty() {
            out.push('(');
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&self.dump(*child));
            }
            out.push(')');
        }
        out
    }
}

/// Scans `input` into a [TypeTree].
///
/// An opening delimiter creates a child of the current node and descends
/// into it, a comma creates a sibling of the current node, a closing
/// delimiter ascends to the parent. Whitespace is ignored, every other
/// character is appended to the name of the current node.
///
/// Delimiters must be balanced: a closing delimiter or a comma at the top
/// level and an unterminated parameter list are reported as errors.
///
/// In the angle grammar a name starting with `'` is a quoted class name and
/// is taken verbatim, quotes included, up to the closing `'`.
pub(crate) fn parse(input: &str, profile: GrammarProfile) -> Result<TypeTree, TypeParseError> {
    let mut tree = TypeTree::new();
    let mut current = TypeTree::ROOT;
    let mut depth = 0usize;
    let mut p = ParserState::new(input);

    loop {
        if let (GrammarProfile::Angle, Some(('\'', rest))) = (profile, p.next_char()) {
            let (literal, rest) = rest.take_while(|c| c != '\'');
            let Some((_, rest)) = rest.next_char() else {
                return Err(TypeParseError::UnterminatedQuote(input.to_owned()));
            };
            let name = &mut tree.nodes[current.0].name;
            name.push('\'');
            name.push_str(literal);
            name.push('\'');
            p = rest;
        }

        let (chunk, rest) = p.take_while(|c| !profile.is_special(c));
        tree.nodes[current.0].name.push_str(chunk);
        p = rest;

        let position = p.calculate_position(input).unwrap_or(0);
        let Some((c, rest)) = p.next_char() else {
            break;
        };
        p = rest;

        let unbalanced = || TypeParseError::UnbalancedDelimiter {
            typ: input.to_owned(),
            delimiter: c,
            position,
        };

        if c == profile.open() {
            current = tree.push_child(current);
            depth += 1;
        } else if c == ',' {
            let parent = tree.nodes[current.0].parent.ok_or_else(unbalanced)?;
            current = tree.push_child(parent);
        } else if c == profile.close() {
            current = tree.nodes[current.0].parent.ok_or_else(unbalanced)?;
            depth -= 1;
        }
        // Whitespace and elided quotes fall through.
    }

    if depth > 0 {
        return Err(TypeParseError::UnclosedDelimiter {
            typ: input.to_owned(),
            open: depth,
        });
    }

    debug_assert!(p.is_at_eof());
    Ok(tree)
}
