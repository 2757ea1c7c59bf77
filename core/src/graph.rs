//! Read-only projections of a [`Cfg`] (and optionally its [`Ddg`]) for
//! rendering: a node/edge list that serializes to JSON, Mermaid export and a
//! block-level dependency summary.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::cfg::{BlockId, Cfg, Transition};
use crate::ddg::Ddg;

/// One basic block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Block index, also used in Mermaid node ids (`N{id}`).
    pub id: usize,
    /// Block label.
    pub label: String,
    /// Statement texts, one per line.
    pub body: String,
    /// `halt`, `return <expr>`, `if (<cond>)` or `jump`.
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    Jump,
    Then,
    Else,
    /// From the block reading a variable to the block assigning it.
    Depends,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Jump => "jump",
            EdgeLabel::Then => "then",
            EdgeLabel::Else => "else",
            EdgeLabel::Depends => "depends",
        }
    }

    fn from_edge(kind: &str) -> Self {
        match kind {
            "then" => EdgeLabel::Then,
            "else" => EdgeLabel::Else,
            _ => EdgeLabel::Jump,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Unique ID within the projection.
    pub id: usize,
    /// Source node ID.
    pub source: usize,
    /// Target node ID.
    pub target: usize,
    pub label: EdgeLabel,
}

/// Nodes and edges of a rendered graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Projection {
    /// Project the reachable blocks of `cfg`. With a `ddg`, a `depends` edge
    /// is added for every distinct (reading block, assigning block) pair.
    pub fn new(cfg: &Cfg<'_>, ddg: Option<&Ddg<'_>>) -> Self {
        let mut projection = Projection::default();
        let mut next_id = 0;
        let mut fresh = || {
            next_id += 1;
            next_id
        };

        let mut node_of: HashMap<BlockId, usize> = HashMap::new();
        for block in cfg.blocks() {
            let id = fresh();
            node_of.insert(block.id, id);
            projection.nodes.push(GraphNode {
                id,
                label: block.label.clone(),
                body: block
                    .statements
                    .iter()
                    .map(|s| cfg.program().text(*s))
                    .collect::<Vec<_>>()
                    .join("\n"),
                end: end_summary(cfg, block.id),
            });
        }

        for block in cfg.blocks() {
            for (kind, next) in block.end.edges() {
                projection.edges.push(GraphEdge {
                    id: fresh(),
                    source: node_of[&block.id],
                    target: node_of[&next],
                    label: EdgeLabel::from_edge(kind),
                });
            }
        }

        if let Some(ddg) = ddg {
            for (source, target) in dependency_pairs(cfg, ddg) {
                projection.edges.push(GraphEdge {
                    id: fresh(),
                    source: node_of[&source],
                    target: node_of[&target],
                    label: EdgeLabel::Depends,
                });
            }
        }

        projection
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Mermaid flowchart; control edges solid, `depends` edges dotted.
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec![String::from("flowchart TD")];

        for node in &self.nodes {
            let mut text = vec![node.label.clone()];
            text.extend(node.body.lines().map(str::to_string));
            text.push(node.end.clone());
            let text = escape_mermaid(&text.join("<br/>"));
            let shape = if node.end.starts_with("if ") {
                format!("    N{}{{\"{}\"}}", node.id, text)
            } else {
                format!("    N{}[\"{}\"]", node.id, text)
            };
            lines.push(shape);
        }

        for edge in &self.edges {
            let arrow = match edge.label {
                EdgeLabel::Jump => " --> ".to_string(),
                EdgeLabel::Depends => " -.->|depends| ".to_string(),
                label => format!(" -->|{}| ", label.as_str()),
            };
            lines.push(format!("    N{}{}N{}", edge.source, arrow, edge.target));
        }

        lines.join("\n")
    }
}

fn escape_mermaid(text: &str) -> String {
    text.replace('"', "#quot;")
}

fn end_summary(cfg: &Cfg<'_>, id: BlockId) -> String {
    match cfg.block(id).end {
        Transition::Return { value: None } => "halt".to_string(),
        Transition::Return { value: Some(value) } => {
            format!("return {}", cfg.program().text(value))
        }
        Transition::Branch { condition, .. } => format!("if ({})", cfg.condition_text(condition)),
        Transition::Jump { .. } => "jump".to_string(),
        Transition::Unset => "unset".to_string(),
    }
}

/// Distinct (block containing a read, block containing a reaching
/// assignment) pairs. Reads or assignments outside the reachable graph are
/// skipped.
fn dependency_pairs(cfg: &Cfg<'_>, ddg: &Ddg<'_>) -> BTreeSet<(BlockId, BlockId)> {
    let mut pairs = BTreeSet::new();
    for (read, reaching) in ddg.dependencies() {
        let Some(source) = cfg.block_containing(*read) else {
            continue;
        };
        for assignment in reaching {
            if let Some(target) = cfg.block_containing(assignment.node()) {
                pairs.insert((source, target));
            }
        }
    }
    pairs
}

/// Block label -> labels of the other blocks whose assignments it reads.
pub type BlockDependencies = BTreeMap<String, BTreeSet<String>>;

/// Per-block summary of `ddg`. Every reachable block has an entry; a block
/// never lists itself.
pub fn block_dependencies(cfg: &Cfg<'_>, ddg: &Ddg<'_>) -> BlockDependencies {
    let mut deps: BlockDependencies = cfg
        .blocks()
        .map(|b| (b.label.clone(), BTreeSet::new()))
        .collect();

    for (source, target) in dependency_pairs(cfg, ddg) {
        if source == target {
            continue;
        }
        deps.entry(cfg.block(source).label.clone())
            .or_default()
            .insert(cfg.block(target).label.clone());
    }
    deps
}
