//! Control Flow Graph (CFG) construction and validation.
//!
//! Blocks live in an arena owned by [`Cfg`] and refer to each other through
//! [`BlockId`]. Parent sets are a derived index: they are recomputed from the
//! transitions by [`Cfg::set_parents`] and checked by [`Cfg::validate`] after
//! construction and after every rewrite.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{AnalysisError, CfgDefect, Result};
use crate::syntax::{NodeRef, Program};
use crate::visit;

/// Index of a block in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub usize);

/// What a branch tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition<'p> {
    /// Synthetic `true`: absent `for` condition, break/continue edges.
    Always,
    Expr(NodeRef<'p>),
}

impl Condition<'_> {
    /// Whether the branch always takes its `then` edge.
    pub fn is_always_true(&self) -> bool {
        match self {
            Condition::Always => true,
            Condition::Expr(node) => node.unparenthesized().kind() == "true",
        }
    }
}

/// The single control transfer ending a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<'p> {
    Return {
        value: Option<NodeRef<'p>>,
    },
    Jump {
        next: BlockId,
    },
    Branch {
        condition: Condition<'p>,
        then: BlockId,
        otherwise: BlockId,
    },
    /// Not wired yet. Never valid in a finished graph.
    Unset,
}

impl Transition<'_> {
    /// Outgoing edges with their kind: `jump`, `then` or `else`.
    pub fn edges(&self) -> Vec<(&'static str, BlockId)> {
        match *self {
            Transition::Jump { next } => vec![("jump", next)],
            Transition::Branch {
                then, otherwise, ..
            } => vec![("then", then), ("else", otherwise)],
            Transition::Return { .. } | Transition::Unset => Vec::new(),
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.edges().into_iter().map(|(_, id)| id).collect()
    }

    /// Point every edge aimed at `from` to `to` instead.
    pub(crate) fn retarget(&mut self, from: BlockId, to: BlockId) {
        match self {
            Transition::Jump { next } => {
                if *next == from {
                    *next = to;
                }
            }
            Transition::Branch {
                then, otherwise, ..
            } => {
                if *then == from {
                    *then = to;
                }
                if *otherwise == from {
                    *otherwise = to;
                }
            }
            Transition::Return { .. } | Transition::Unset => {}
        }
    }
}

/// A straight-line statement sequence ending in one transition.
#[derive(Debug, Clone)]
pub struct BasicBlock<'p> {
    /// Index of the block in its CFG's arena.
    pub id: BlockId,
    /// Unique, human-readable name such as `while5`.
    pub label: String,
    /// Simple statements, in execution order.
    pub statements: Vec<NodeRef<'p>>,
    /// How control leaves the block.
    pub end: Transition<'p>,
    pub(crate) parents: BTreeSet<BlockId>,
}

impl BasicBlock<'_> {
    pub fn parents(&self) -> &BTreeSet<BlockId> {
        &self.parents
    }
}

/// Control flow graph of one statement sequence.
#[derive(Debug, Clone)]
pub struct Cfg<'p> {
    program: &'p Program,
    blocks: Vec<BasicBlock<'p>>,
    entry: BlockId,
    counter: usize,
}

impl<'p> Cfg<'p> {
    /// Build the CFG of the program's entry scope, then set and validate
    /// parent sets.
    pub fn build(program: &'p Program) -> Result<Self> {
        let mut cfg = Cfg {
            program,
            blocks: Vec::new(),
            entry: BlockId(0),
            counter: 0,
        };
        let entry = cfg.add_block("start", Transition::Return { value: None });
        cfg.entry = entry;

        let mut builder = CfgBuilder {
            cfg,
            current: entry,
            loop_stack: Vec::new(),
        };
        builder.visit_statements(program.entry_scope().body)?;

        let mut cfg = builder.cfg;
        cfg.refresh()?;
        debug!(blocks = cfg.order().len(), "built cfg");
        Ok(cfg)
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub(crate) fn set_entry(&mut self, entry: BlockId) {
        self.entry = entry;
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock<'p> {
        &self.blocks[id.0]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock<'p> {
        &mut self.blocks[id.0]
    }

    /// Reachable blocks in breadth-first order from the entry.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock<'p>> {
        self.order().into_iter().map(move |id| self.block(id))
    }

    /// Look a reachable block up by label.
    pub fn find(&self, label: &str) -> Option<&BasicBlock<'p>> {
        self.blocks().find(|b| b.label == label)
    }

    /// Ids of reachable blocks, breadth-first, `then` before `else`.
    pub fn order(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(self.entry);

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            for next in self.block(id).end.successors() {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }
        order
    }

    pub(crate) fn add_block(&mut self, prefix: &str, end: Transition<'p>) -> BlockId {
        self.counter += 1;
        let label = format!("{prefix}{}", self.counter);
        self.add_labeled_block(label, end)
    }

    pub(crate) fn add_labeled_block(&mut self, label: String, end: Transition<'p>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock {
            id,
            label,
            statements: Vec::new(),
            end,
            parents: BTreeSet::new(),
        });
        id
    }

    /// Recompute every parent set from the transitions of reachable blocks.
    pub fn set_parents(&mut self) {
        for block in &mut self.blocks {
            block.parents.clear();
        }
        for id in self.order() {
            for next in self.block(id).end.successors() {
                self.block_mut(next).parents.insert(id);
            }
        }
    }

    /// Check the structural invariants of the reachable graph.
    pub fn validate(&self) -> Result<(), CfgDefect> {
        let order = self.order();
        let reachable: HashSet<BlockId> = order.iter().copied().collect();

        for &id in &order {
            let block = self.block(id);
            if block.end == Transition::Unset {
                return Err(CfgDefect::UnsetTransition {
                    block: block.label.clone(),
                });
            }
            for (edge, next) in block.end.edges() {
                if !self.block(next).parents.contains(&id) {
                    return Err(CfgDefect::MissingParent {
                        target: self.block(next).label.clone(),
                        parent: block.label.clone(),
                        edge,
                    });
                }
            }
            for &parent in &block.parents {
                let targets_us = reachable.contains(&parent)
                    && self.block(parent).end.successors().contains(&id);
                if !targets_us {
                    return Err(CfgDefect::StrayParent {
                        block: block.label.clone(),
                        parent: self.block(parent).label.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// `set_parents` followed by `validate`.
    pub(crate) fn refresh(&mut self) -> Result<()> {
        self.set_parents();
        self.validate()?;
        Ok(())
    }

    /// The reachable block whose statements, condition or returned value
    /// contain `node`.
    pub fn block_containing(&self, node: NodeRef<'_>) -> Option<BlockId> {
        let range = node.0.byte_range();
        let covers = |owner: NodeRef<'_>| {
            let own = owner.0.byte_range();
            own.start <= range.start && range.end <= own.end
        };

        self.order().into_iter().find(|&id| {
            let block = self.block(id);
            if block.statements.iter().any(|s| covers(*s)) {
                return true;
            }
            match block.end {
                Transition::Branch {
                    condition: Condition::Expr(cond),
                    ..
                } => covers(cond),
                Transition::Return { value: Some(value) } => covers(value),
                _ => false,
            }
        })
    }

    /// Statement and transition text, the way the text dump renders it.
    pub fn end_text(&self, id: BlockId) -> String {
        match self.block(id).end {
            Transition::Return { value: None } => "halt".to_string(),
            Transition::Return { value: Some(value) } => {
                format!("return {}", self.program.text(value))
            }
            Transition::Jump { next } => format!("jump to {}", self.block(next).label),
            Transition::Branch {
                condition,
                then,
                otherwise,
            } => format!(
                "jump if ({}) to {} else {}",
                self.condition_text(condition),
                self.block(then).label,
                self.block(otherwise).label
            ),
            Transition::Unset => "unset".to_string(),
        }
    }

    pub fn condition_text(&self, condition: Condition<'_>) -> String {
        match condition {
            Condition::Always => "true".to_string(),
            Condition::Expr(node) => self.program.text(node.unparenthesized()).to_string(),
        }
    }

    /// Total statements across reachable blocks.
    pub fn statement_count(&self) -> usize {
        self.blocks().map(|b| b.statements.len()).sum()
    }
}

impl fmt::Display for Cfg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.order() {
            let block = self.block(id);
            writeln!(f, "{}:", block.label)?;
            for stmt in &block.statements {
                writeln!(f, "  {}", self.program.text(*stmt))?;
            }
            writeln!(f, "  {}", self.end_text(id))?;
        }
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

struct CfgBuilder<'p> {
    cfg: Cfg<'p>,
    current: BlockId,
    /// (continue target, break target) per enclosing loop.
    loop_stack: Vec<(BlockId, BlockId)>,
}

impl<'p> CfgBuilder<'p> {
    fn visit_statements(&mut self, node: NodeRef<'p>) -> Result<()> {
        for child in node.named_children() {
            self.visit_statement(child)?;
        }
        Ok(())
    }

    fn visit_statement(&mut self, node: NodeRef<'p>) -> Result<()> {
        match node.kind() {
            "expression_statement" | "lexical_declaration" | "variable_declaration" => {
                self.cfg.block_mut(self.current).statements.push(node);
                Ok(())
            }
            "statement_block" => self.visit_statements(node),
            "empty_statement" | "hash_bang_line" => Ok(()),
            kind if kind.contains("comment") => Ok(()),
            "if_statement" => self.visit_if(node),
            "while_statement" => self.visit_while(node),
            "do_statement" => self.visit_do_while(node),
            "for_statement" => self.visit_for(node),
            "break_statement" => self.visit_jump_out(node, "break"),
            "continue_statement" => self.visit_jump_out(node, "continue"),
            "return_statement" => self.visit_return(node),
            "for_in_statement" => Err(AnalysisError::unsupported("for-in/for-of loop", node.0)),
            "switch_statement" => Err(AnalysisError::unsupported("switch statement", node.0)),
            "try_statement" => Err(AnalysisError::unsupported("try statement", node.0)),
            "throw_statement" => Err(AnalysisError::unsupported("throw statement", node.0)),
            "labeled_statement" => Err(AnalysisError::unsupported("labeled statement", node.0)),
            "function_declaration" | "generator_function_declaration" => {
                Err(AnalysisError::unsupported("nested function declaration", node.0))
            }
            kind => Err(AnalysisError::unsupported(kind, node.0)),
        }
    }

    /// The current block's end, which code after a construct inherits.
    fn current_end(&self) -> Transition<'p> {
        self.cfg.block(self.current).end
    }

    fn set_current_end(&mut self, end: Transition<'p>) {
        self.cfg.block_mut(self.current).end = end;
    }

    fn visit_if(&mut self, node: NodeRef<'p>) -> Result<()> {
        let condition = self.condition_of(node)?;
        let inherited = self.current_end();
        let next = self.cfg.add_block("next", inherited);
        let then = self.cfg.add_block("then", Transition::Jump { next });
        let otherwise = self.cfg.add_block("else", Transition::Jump { next });

        self.set_current_end(Transition::Branch {
            condition,
            then,
            otherwise,
        });

        if let Some(consequence) = node.field("consequence") {
            self.current = then;
            self.visit_statement(consequence)?;
        }
        if let Some(alternative) = visit::else_statement(node) {
            self.current = otherwise;
            self.visit_statement(alternative)?;
        }

        self.current = next;
        Ok(())
    }

    fn visit_while(&mut self, node: NodeRef<'p>) -> Result<()> {
        let condition = self.condition_of(node)?;
        let inherited = self.current_end();
        let next = self.cfg.add_block("next", inherited);
        let cond = self.cfg.add_block("while", Transition::Unset);
        let body = self.cfg.add_block("loop", Transition::Jump { next: cond });

        self.cfg.block_mut(cond).end = Transition::Branch {
            condition,
            then: body,
            otherwise: next,
        };
        self.set_current_end(Transition::Jump { next: cond });

        self.visit_loop_body(node.field("body"), body, cond, next)
    }

    fn visit_do_while(&mut self, node: NodeRef<'p>) -> Result<()> {
        let condition = self.condition_of(node)?;
        let inherited = self.current_end();
        let next = self.cfg.add_block("next", inherited);
        let cond = self.cfg.add_block("dowhile", Transition::Unset);
        let body = self.cfg.add_block("do", Transition::Jump { next: cond });

        self.cfg.block_mut(cond).end = Transition::Branch {
            condition,
            then: body,
            otherwise: next,
        };
        self.set_current_end(Transition::Jump { next: body });

        self.visit_loop_body(node.field("body"), body, cond, next)
    }

    fn visit_for(&mut self, node: NodeRef<'p>) -> Result<()> {
        let clauses = visit::for_clauses(node);
        let inherited = self.current_end();
        let next = self.cfg.add_block("next", inherited);
        let cond = self.cfg.add_block("for", Transition::Unset);
        let init = self.cfg.add_block("init", Transition::Jump { next: cond });
        let incr = self.cfg.add_block("incr", Transition::Jump { next: cond });
        let body = self.cfg.add_block("body", Transition::Jump { next: incr });

        if let Some(initializer) = clauses.initializer {
            self.cfg.block_mut(init).statements.push(initializer);
        }
        if let Some(increment) = clauses.increment {
            self.cfg.block_mut(incr).statements.push(increment);
        }
        self.cfg.block_mut(cond).end = Transition::Branch {
            condition: clauses
                .condition
                .map(Condition::Expr)
                .unwrap_or(Condition::Always),
            then: body,
            otherwise: next,
        };
        self.set_current_end(Transition::Jump { next: init });

        self.visit_loop_body(clauses.body, body, incr, next)
    }

    fn visit_loop_body(
        &mut self,
        body_node: Option<NodeRef<'p>>,
        body: BlockId,
        continue_target: BlockId,
        break_target: BlockId,
    ) -> Result<()> {
        self.loop_stack.push((continue_target, break_target));
        self.current = body;
        if let Some(body_node) = body_node {
            self.visit_statement(body_node)?;
        }
        self.loop_stack.pop();
        self.current = break_target;
        Ok(())
    }

    fn visit_jump_out(&mut self, node: NodeRef<'p>, keyword: &'static str) -> Result<()> {
        if node.field("label").is_some() {
            return Err(AnalysisError::unsupported(format!("labeled {keyword}"), node.0));
        }
        let Some(&(continue_target, break_target)) = self.loop_stack.last() else {
            return Err(AnalysisError::NoEnclosingLoop {
                keyword,
                line: node.line(),
            });
        };
        let target = if keyword == "break" {
            break_target
        } else {
            continue_target
        };

        let inherited = self.current_end();
        let dead = self.cfg.add_block("dead", inherited);
        self.set_current_end(Transition::Branch {
            condition: Condition::Always,
            then: target,
            otherwise: dead,
        });
        self.current = dead;
        Ok(())
    }

    fn visit_return(&mut self, node: NodeRef<'p>) -> Result<()> {
        let value = node.first_named();
        let inherited = self.current_end();
        let rest = self.cfg.add_block("dead", inherited);
        self.set_current_end(Transition::Return { value });
        self.current = rest;
        Ok(())
    }

    fn condition_of(&self, node: NodeRef<'p>) -> Result<Condition<'p>> {
        node.field("condition")
            .map(Condition::Expr)
            .ok_or_else(|| AnalysisError::unsupported("statement without condition", node.0))
    }
}
