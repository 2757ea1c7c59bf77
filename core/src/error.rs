//! Error types shared by every stage of the pipeline.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// Everything that can abort an analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The tree-sitter grammar could not be loaded into the parser.
    #[error("failed to load grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    /// The parser gave up without producing a tree.
    #[error("parser produced no syntax tree")]
    ParseFailed,

    /// The tree contains an error or missing node.
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    /// A construct outside the supported statement subset.
    #[error("not implemented: {construct} (line {line})")]
    Unsupported { construct: String, line: usize },

    /// `break` or `continue` with an empty loop stack.
    #[error("`{keyword}` outside of an enclosing loop (line {line})")]
    NoEnclosingLoop { keyword: &'static str, line: usize },

    /// The graph violates its own invariants. Always a builder bug.
    #[error("internal CFG inconsistency: {0}")]
    Inconsistent(#[from] CfgDefect),
}

/// A broken structural invariant found by `Cfg::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgDefect {
    #[error("block {block} has an unset transition")]
    UnsetTransition { block: String },

    #[error("block {target} ({edge}) missing parent {parent}")]
    MissingParent {
        target: String,
        parent: String,
        edge: &'static str,
    },

    #[error("block {block} lists {parent} as parent but {parent} does not target it")]
    StrayParent { block: String, parent: String },
}

impl AnalysisError {
    pub(crate) fn unsupported(construct: impl Into<String>, node: tree_sitter::Node<'_>) -> Self {
        AnalysisError::Unsupported {
            construct: construct.into(),
            line: node.start_position().row + 1,
        }
    }
}
