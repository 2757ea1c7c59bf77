//! Data Dependency Graph (DDG): reaching definitions over a [`Cfg`].
//!
//! For every variable read, the DDG records the set of assignments that may
//! have produced the value seen there. The analysis is a monotone fixpoint:
//! states only grow (per-variable set union), and a block is processed again
//! only when its incoming state brings something new.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::cfg::{BlockId, Cfg, Condition, Transition};
use crate::error::Result;
use crate::rename::PhysicalNames;
use crate::syntax::{NodeRef, Program};
use crate::visit::{self, Effect};

/// Physical name used when identifier resolution has no entry.
pub const UNKNOWN: &str = "?";

/// Default cap on processed block visits.
pub const DEFAULT_MAX_VISITS: usize = 1000;

/// Kind of definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentKind {
    /// `let`/`const`/`var` declarator with an initializer
    Declaration,
    /// `x = e`
    Simple,
    /// `x += e`, `x -= e`, ...
    Compound,
    /// `x++`, `x--`, `++x`, `--x`
    Update,
}

/// A write to a single variable.
#[derive(Debug, Clone, Copy)]
pub struct Assignment<'p> {
    node: NodeRef<'p>,
    kind: AssignmentKind,
    target: NodeRef<'p>,
}

impl<'p> Assignment<'p> {
    /// Classify `node`; `None` unless it writes exactly one identifier.
    pub fn from_node(node: NodeRef<'p>) -> Option<Self> {
        let (kind, target) = match node.kind() {
            "variable_declarator" => {
                node.field("value")?;
                (AssignmentKind::Declaration, node.field("name")?)
            }
            "assignment_expression" => (
                AssignmentKind::Simple,
                node.field("left")?.unparenthesized(),
            ),
            "augmented_assignment_expression" => (
                AssignmentKind::Compound,
                node.field("left")?.unparenthesized(),
            ),
            "update_expression" => (
                AssignmentKind::Update,
                node.field("argument")?.unparenthesized(),
            ),
            _ => return None,
        };
        (target.kind() == "identifier").then_some(Self { node, kind, target })
    }

    pub fn node(&self) -> NodeRef<'p> {
        self.node
    }

    pub fn kind(&self) -> AssignmentKind {
        self.kind
    }

    /// The identifier written.
    pub fn target(&self) -> NodeRef<'p> {
        self.target
    }
}

impl PartialEq for Assignment<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Assignment<'_> {}

impl Hash for Assignment<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl PartialOrd for Assignment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Assignment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node.cmp(&other.node)
    }
}

pub type Reaching<'p> = BTreeSet<Assignment<'p>>;

/// Variable read -> assignments that may reach it.
#[derive(Debug, Clone)]
pub struct Ddg<'p> {
    program: &'p Program,
    pub(crate) dependencies: BTreeMap<NodeRef<'p>, Reaching<'p>>,
    truncated: bool,
}

impl<'p> Ddg<'p> {
    pub(crate) fn new(program: &'p Program) -> Self {
        Self {
            program,
            dependencies: BTreeMap::new(),
            truncated: false,
        }
    }

    /// Reaching definitions over `cfg`, keyed by the physical names in
    /// `names`. Stops after `max_visits` processed blocks and marks the
    /// result truncated.
    pub fn build(cfg: &Cfg<'p>, names: &PhysicalNames<'p>, max_visits: usize) -> Result<Self> {
        let mut fixpoint = Fixpoint::new(cfg, names, max_visits)?;
        fixpoint.run();
        let Fixpoint {
            dependencies,
            truncated,
            visits,
            ..
        } = fixpoint;
        debug!(visits, reads = dependencies.len(), truncated, "built ddg");

        Ok(Self {
            program: cfg.program(),
            dependencies,
            truncated,
        })
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// Every recorded read in document order.
    pub fn dependencies(&self) -> &BTreeMap<NodeRef<'p>, Reaching<'p>> {
        &self.dependencies
    }

    /// Reads of the variable spelled `name`, in document order.
    pub fn reads_of<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (NodeRef<'p>, &'a Reaching<'p>)> + 'a {
        self.dependencies
            .iter()
            .filter(move |(read, _)| self.program.text(**read) == name)
            .map(|(read, reaching)| (*read, reaching))
    }

    /// Whether the visit cap cut the fixpoint short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// One header per read, reaching assignments indented below it.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (read, reaching) in &self.dependencies {
            let _ = writeln!(out, "{} (line {})", self.program.text(*read), read.line());
            for assignment in reaching {
                let _ = writeln!(
                    out,
                    "  <- {} (line {})",
                    self.program.text(assignment.node()),
                    assignment.node().line()
                );
            }
        }
        out
    }

    /// One line per (read, assignment) pair.
    pub fn to_flat_text(&self) -> String {
        let mut out = String::new();
        for (read, reaching) in &self.dependencies {
            let name = self.program.text(*read);
            if reaching.is_empty() {
                let _ = writeln!(out, "{name} at :{} has no reaching assignment", read.line());
            }
            for assignment in reaching {
                let _ = writeln!(
                    out,
                    "{name} at :{} depends on assignment at :{} ({})",
                    read.line(),
                    assignment.node().line(),
                    self.program.text(assignment.node())
                );
            }
        }
        out
    }
}

// ============================================================================
// Fixpoint
// ============================================================================

type State<'p> = BTreeMap<String, Reaching<'p>>;

/// Per-variable union of `incoming` into `state`.
fn merge_into<'p>(state: &mut State<'p>, incoming: &State<'p>) {
    for (id, reaching) in incoming {
        state
            .entry(id.clone())
            .or_default()
            .extend(reaching.iter().copied());
    }
}

/// Whether every definition in `incoming` is already in `recorded`.
fn is_covered(incoming: &State<'_>, recorded: &State<'_>) -> bool {
    incoming.iter().all(|(id, reaching)| {
        recorded
            .get(id)
            .is_some_and(|known| reaching.is_subset(known))
    })
}

/// Reads and writes of one block, extracted once up front.
struct BlockEffects<'p> {
    statements: Vec<Effect<'p>>,
    exit_reads: Vec<NodeRef<'p>>,
}

struct Fixpoint<'a, 'p> {
    cfg: &'a Cfg<'p>,
    names: &'a PhysicalNames<'p>,
    effects: HashMap<BlockId, BlockEffects<'p>>,
    recorded: HashMap<BlockId, State<'p>>,
    dependencies: BTreeMap<NodeRef<'p>, Reaching<'p>>,
    visits: usize,
    max_visits: usize,
    truncated: bool,
}

impl<'a, 'p> Fixpoint<'a, 'p> {
    fn new(cfg: &'a Cfg<'p>, names: &'a PhysicalNames<'p>, max_visits: usize) -> Result<Self> {
        let mut effects = HashMap::new();
        for block in cfg.blocks() {
            let mut statements = Vec::new();
            for stmt in &block.statements {
                statements.extend(visit::effects(*stmt)?);
            }
            let exit_reads = match block.end {
                Transition::Branch {
                    condition: Condition::Expr(cond),
                    ..
                } => visit::referenced_variables(cond)?,
                Transition::Return { value: Some(value) } => visit::referenced_variables(value)?,
                _ => Vec::new(),
            };
            effects.insert(
                block.id,
                BlockEffects {
                    statements,
                    exit_reads,
                },
            );
        }

        Ok(Self {
            cfg,
            names,
            effects,
            recorded: HashMap::new(),
            dependencies: BTreeMap::new(),
            visits: 0,
            max_visits,
            truncated: false,
        })
    }

    fn run(&mut self) {
        let mut work: VecDeque<(BlockId, State<'p>)> = VecDeque::new();
        work.push_back((self.cfg.entry(), State::new()));

        while let Some((id, incoming)) = work.pop_front() {
            if let Some(recorded) = self.recorded.get(&id) {
                if is_covered(&incoming, recorded) {
                    trace!(block = %self.cfg.block(id).label, "no update");
                    continue;
                }
            }

            if self.visits >= self.max_visits {
                error!(
                    max_visits = self.max_visits,
                    "reaching definitions did not converge; result is truncated"
                );
                self.truncated = true;
                return;
            }
            self.visits += 1;

            let mut state = self.recorded.remove(&id).unwrap_or_default();
            merge_into(&mut state, &incoming);
            self.recorded.insert(id, state.clone());
            trace!(block = %self.cfg.block(id).label, "processing");

            self.process_block(id, &mut state);

            match self.cfg.block(id).end {
                Transition::Branch {
                    then, otherwise, ..
                } => {
                    work.push_back((then, state.clone()));
                    work.push_back((otherwise, state));
                }
                Transition::Jump { next } => work.push_back((next, state)),
                Transition::Return { .. } | Transition::Unset => {}
            }
        }
    }

    fn process_block(&mut self, id: BlockId, state: &mut State<'p>) {
        let Self {
            cfg,
            names,
            effects,
            dependencies,
            ..
        } = self;
        let Some(effects) = effects.get(&id) else {
            return;
        };
        let names: &PhysicalNames<'p> = names;
        let program = cfg.program();

        for effect in &effects.statements {
            for read in &effect.reads {
                let reaching = state
                    .get(physical_read(program, names, *read))
                    .cloned()
                    .unwrap_or_default();
                dependencies.insert(*read, reaching);
            }
            let Some(write) = effect.write else {
                continue;
            };
            if let Some(name) = physical_write(program, names, write) {
                state.insert(name, BTreeSet::from([write]));
            }
        }

        for read in &effects.exit_reads {
            let reaching = state
                .get(physical_read(program, names, *read))
                .cloned()
                .unwrap_or_default();
            dependencies.insert(*read, reaching);
        }
    }
}

fn physical_read<'a, 'p>(
    program: &Program,
    names: &'a PhysicalNames<'p>,
    read: NodeRef<'p>,
) -> &'a str {
    match names.get(read) {
        Some(name) => name,
        None => {
            debug!(name = program.text(read), line = read.line(), "unresolved read");
            UNKNOWN
        }
    }
}

/// Unresolved targets are dropped, so `?` only ever collects reads.
fn physical_write<'p>(
    program: &Program,
    names: &PhysicalNames<'p>,
    write: Assignment<'p>,
) -> Option<String> {
    let name = names.get(write.target()).map(str::to_string);
    if name.is_none() {
        warn!(
            name = program.text(write.target()),
            line = write.target().line(),
            "unresolved assignment target, skipped"
        );
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::physical_names;
    use crate::syntax::Dialect;

    fn reaching_texts(ddg: &Ddg<'_>, name: &str) -> Vec<Vec<String>> {
        ddg.reads_of(name)
            .map(|(_, reaching)| {
                reaching
                    .iter()
                    .map(|a| ddg.program().text(a.node()).to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_ddg_kill_in_straight_line() {
        let program = Program::parse("let x = 1\nx = 2\nlet y = x\n", Dialect::TypeScript).unwrap();
        let cfg = Cfg::build(&program).unwrap();
        let names = physical_names(&program);
        let ddg = Ddg::build(&cfg, &names, DEFAULT_MAX_VISITS).unwrap();
        assert_eq!(reaching_texts(&ddg, "x"), vec![vec!["x = 2".to_string()]]);
        assert!(!ddg.truncated());
    }

    #[test]
    fn test_ddg_visit_cap_truncates() {
        let src = "let i = 0\nwhile (i < 3) {\n  i++\n}\n";
        let program = Program::parse(src, Dialect::TypeScript).unwrap();
        let cfg = Cfg::build(&program).unwrap();
        let names = physical_names(&program);
        let ddg = Ddg::build(&cfg, &names, 2).unwrap();
        assert!(ddg.truncated());
    }

    #[test]
    fn test_ddg_unresolved_assignment_is_skipped() {
        let program = Program::parse("g = 1\nlet y = g\nlet z = h\n", Dialect::JavaScript).unwrap();
        let cfg = Cfg::build(&program).unwrap();
        let names = physical_names(&program);
        let ddg = Ddg::build(&cfg, &names, DEFAULT_MAX_VISITS).unwrap();
        assert_eq!(reaching_texts(&ddg, "g"), vec![Vec::<String>::new()]);
        assert_eq!(reaching_texts(&ddg, "h"), vec![Vec::<String>::new()]);
    }

    #[test]
    fn test_merge_and_cover() {
        let program = Program::parse("a = 1\na = 2\n", Dialect::JavaScript).unwrap();
        let stmts = program.root().named_children();
        let first = Assignment::from_node(stmts[0].first_named().unwrap()).unwrap();
        let second = Assignment::from_node(stmts[1].first_named().unwrap()).unwrap();

        let mut state = State::new();
        state.insert("a".into(), BTreeSet::from([first]));
        let incoming = State::from([("a".to_string(), BTreeSet::from([second]))]);
        assert!(!is_covered(&incoming, &state));

        merge_into(&mut state, &incoming);
        assert_eq!(state["a"].len(), 2);
        assert!(is_covered(&incoming, &state));
    }

    #[test]
    fn test_text_dumps() {
        let program = Program::parse("let a = 1\nlet b = a\n", Dialect::TypeScript).unwrap();
        let cfg = Cfg::build(&program).unwrap();
        let names = physical_names(&program);
        let ddg = Ddg::build(&cfg, &names, DEFAULT_MAX_VISITS).unwrap();
        assert_eq!(ddg.to_text(), "a (line 2)\n  <- a = 1 (line 1)\n");
        assert_eq!(
            ddg.to_flat_text(),
            "a at :2 depends on assignment at :1 (a = 1)\n"
        );
    }
}
