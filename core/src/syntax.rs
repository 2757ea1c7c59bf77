//! Parsing front end backed by tree-sitter.
//!
//! Everything downstream sees the tree through [`Program`] and [`NodeRef`]:
//! node kinds, ordered children, field lookup, text and line numbers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{AnalysisError, Result};

/// Grammar used to parse the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    TypeScript,
    JavaScript,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::TypeScript => "typescript",
            Dialect::JavaScript => "javascript",
        }
    }
}

/// A parsed source fragment. Graphs built from it borrow it.
pub struct Program {
    source: String,
    tree: Tree,
    dialect: Dialect,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("dialect", &self.dialect)
            .field("bytes", &self.source.len())
            .finish()
    }
}

impl Program {
    /// Parse `source`, rejecting trees that contain error nodes.
    pub fn parse(source: impl Into<String>, dialect: Dialect) -> Result<Self> {
        let source = source.into();
        let mut parser = Parser::new();
        let lang = match dialect {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE,
        };
        parser.set_language(&lang.into())?;

        let tree = parser
            .parse(&source, None)
            .ok_or(AnalysisError::ParseFailed)?;

        if let Some(bad) = first_error(tree.root_node()) {
            let pos = bad.start_position();
            return Err(AnalysisError::Syntax {
                line: pos.row + 1,
                column: pos.column + 1,
            });
        }

        Ok(Self {
            source,
            tree,
            dialect,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef(self.tree.root_node())
    }

    /// The statement list the analysis starts from.
    ///
    /// A program made of exactly one function declaration is unwrapped to that
    /// function's body so examples can be written either way.
    pub fn entry_scope(&self) -> EntryScope<'_> {
        let root = self.root();
        let items: Vec<NodeRef<'_>> = root
            .named_children()
            .into_iter()
            .filter(|n| !n.is_comment())
            .collect();

        if let [only] = items.as_slice() {
            if only.kind() == "function_declaration" {
                if let Some(body) = only.field("body") {
                    return EntryScope {
                        body,
                        function: Some(*only),
                    };
                }
            }
        }

        EntryScope {
            body: root,
            function: None,
        }
    }

    /// Text covered by `node`.
    pub fn text(&self, node: NodeRef<'_>) -> &str {
        node.0.utf8_text(self.source.as_bytes()).unwrap_or("")
    }
}

/// Where statement walking begins.
#[derive(Debug, Clone, Copy)]
pub struct EntryScope<'p> {
    /// The `program` node or the unwrapped `statement_block`.
    pub body: NodeRef<'p>,
    /// The unwrapped function declaration, if any.
    pub function: Option<NodeRef<'p>>,
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error).or(Some(node))
}

/// A syntax node with positional identity.
///
/// Two refs are equal only when they denote the same node of the same tree;
/// ordering follows document order.
#[derive(Clone, Copy)]
pub struct NodeRef<'p>(pub Node<'p>);

impl<'p> NodeRef<'p> {
    pub fn kind(&self) -> &'static str {
        self.0.kind()
    }

    pub fn id(&self) -> usize {
        self.0.id()
    }

    /// One-based line of the node's first character.
    pub fn line(&self) -> usize {
        self.0.start_position().row + 1
    }

    pub fn field(&self, name: &str) -> Option<NodeRef<'p>> {
        self.0.child_by_field_name(name).map(NodeRef)
    }

    pub fn named_children(&self) -> Vec<NodeRef<'p>> {
        let mut cursor = self.0.walk();
        self.0.named_children(&mut cursor).map(NodeRef).collect()
    }

    pub fn children(&self) -> Vec<NodeRef<'p>> {
        let mut cursor = self.0.walk();
        self.0.children(&mut cursor).map(NodeRef).collect()
    }

    pub fn is_named(&self) -> bool {
        self.0.is_named()
    }

    pub fn is_comment(&self) -> bool {
        self.kind().contains("comment")
    }

    /// First named, non-comment child.
    pub fn first_named(&self) -> Option<NodeRef<'p>> {
        self.named_children().into_iter().find(|n| !n.is_comment())
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparenthesized(self) -> NodeRef<'p> {
        let mut node = self;
        while node.kind() == "parenthesized_expression" {
            match node.first_named() {
                Some(inner) => node = inner,
                None => break,
            }
        }
        node
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.0.start_position();
        write!(f, "{}@{}:{}", self.kind(), start.row + 1, start.column + 1)
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for NodeRef<'_> {}

impl Hash for NodeRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for NodeRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .start_byte()
            .cmp(&other.0.start_byte())
            .then_with(|| other.0.end_byte().cmp(&self.0.end_byte()))
            .then_with(|| self.id().cmp(&other.id()))
    }
}
