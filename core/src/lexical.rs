//! Flow-insensitive dependencies: every read resolves to the nearest
//! assignment of the same name that is textually visible before it.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::ddg::{Assignment, AssignmentKind, Ddg};
use crate::error::{AnalysisError, Result};
use crate::scope::ScopeStack;
use crate::syntax::{NodeRef, Program};
use crate::visit::{self, Effect};

impl<'p> Ddg<'p> {
    /// Lexical baseline: walk statements in document order, one frame per
    /// block. Each read gets at most one reaching assignment.
    pub fn lexical(program: &'p Program) -> Result<Self> {
        let mut walker = LexicalWalker {
            program,
            // `None` marks a declaration without an initializer.
            scope: ScopeStack::new(),
            ddg: Ddg::new(program),
        };

        let entry = program.entry_scope();
        for statement in entry.body.named_children() {
            walker.statement(statement)?;
        }

        debug!(reads = walker.ddg.dependencies.len(), "built lexical ddg");
        Ok(walker.ddg)
    }
}

struct LexicalWalker<'p> {
    program: &'p Program,
    scope: ScopeStack<Option<Assignment<'p>>>,
    ddg: Ddg<'p>,
}

impl<'p> LexicalWalker<'p> {
    fn statement(&mut self, node: NodeRef<'p>) -> Result<()> {
        match node.kind() {
            "statement_block" => {
                self.scope.push();
                let result = self.statements(node);
                self.scope.pop();
                result?;
            }
            "lexical_declaration" | "variable_declaration" => {
                self.declare_uninitialized(node);
                self.simple(node)?;
            }
            "expression_statement" => self.simple(node)?,
            "if_statement" => {
                self.condition(node)?;
                if let Some(then) = node.field("consequence") {
                    self.statement(then)?;
                }
                if let Some(otherwise) = visit::else_statement(node) {
                    self.statement(otherwise)?;
                }
            }
            "while_statement" => {
                self.condition(node)?;
                if let Some(body) = node.field("body") {
                    self.statement(body)?;
                }
            }
            "do_statement" => {
                if let Some(body) = node.field("body") {
                    self.statement(body)?;
                }
                self.condition(node)?;
            }
            "for_statement" => {
                self.scope.push();
                let result = self.for_statement(node);
                self.scope.pop();
                result?;
            }
            "return_statement" => {
                if let Some(value) = node.first_named() {
                    self.reads(&visit::referenced_variables(value)?);
                }
            }
            "break_statement" | "continue_statement" | "empty_statement" | "hash_bang_line" => {}
            _ if node.is_comment() => {}
            other => return Err(AnalysisError::unsupported(other, node.0)),
        }
        Ok(())
    }

    fn statements(&mut self, block: NodeRef<'p>) -> Result<()> {
        for child in block.named_children() {
            self.statement(child)?;
        }
        Ok(())
    }

    fn for_statement(&mut self, node: NodeRef<'p>) -> Result<()> {
        let clauses = visit::for_clauses(node);
        if let Some(init) = clauses.initializer {
            if matches!(init.kind(), "lexical_declaration" | "variable_declaration") {
                self.declare_uninitialized(init);
            }
            self.simple(init)?;
        }
        if let Some(condition) = clauses.condition {
            self.reads(&visit::referenced_variables(condition)?);
        }
        if let Some(body) = clauses.body {
            self.statement(body)?;
        }
        if let Some(increment) = clauses.increment {
            self.simple(increment)?;
        }
        Ok(())
    }

    fn condition(&mut self, node: NodeRef<'p>) -> Result<()> {
        if let Some(condition) = node.field("condition") {
            self.reads(&visit::referenced_variables(condition)?);
        }
        Ok(())
    }

    fn simple(&mut self, node: NodeRef<'p>) -> Result<()> {
        for effect in visit::effects(node)? {
            self.apply(effect);
        }
        Ok(())
    }

    fn declare_uninitialized(&mut self, declaration: NodeRef<'p>) {
        for declarator in declaration.named_children() {
            if declarator.kind() != "variable_declarator" || declarator.field("value").is_some() {
                continue;
            }
            if let Some(name) = declarator.field("name") {
                self.scope.bind(self.program.text(name), None);
            }
        }
    }

    fn apply(&mut self, effect: Effect<'p>) {
        self.reads(&effect.reads);
        if let Some(write) = effect.write {
            let name = self.program.text(write.target());
            if write.kind() == AssignmentKind::Declaration {
                self.scope.bind(name, Some(write));
            } else if !self.scope.assign(name, Some(write)) {
                warn!(
                    name,
                    line = write.target().line(),
                    "assignment to undeclared name, skipped"
                );
            }
        }
    }

    fn reads(&mut self, reads: &[NodeRef<'p>]) {
        for read in reads {
            let reaching: BTreeSet<_> = self
                .scope
                .lookup(self.program.text(*read))
                .copied()
                .flatten()
                .into_iter()
                .collect();
            self.ddg.dependencies.insert(*read, reaching);
        }
    }
}
