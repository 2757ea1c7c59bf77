//! Syntax helpers shared by the CFG builder and the DDG builders: reads and
//! writes of simple statements, and the clauses of structured statements.

use crate::ddg::Assignment;
use crate::error::{AnalysisError, Result};
use crate::syntax::NodeRef;

/// One step of a statement: identifiers read, then at most one write.
#[derive(Debug, Clone, Default)]
pub struct Effect<'p> {
    pub reads: Vec<NodeRef<'p>>,
    pub write: Option<Assignment<'p>>,
}

/// Split a simple statement (or a bare `for` initializer/incrementor
/// expression) into ordered effects.
pub fn effects<'p>(statement: NodeRef<'p>) -> Result<Vec<Effect<'p>>> {
    let mut out = Vec::new();
    match statement.kind() {
        "lexical_declaration" | "variable_declaration" => {
            for declarator in statement.named_children() {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let name = declarator.field("name");
                if name.is_some_and(|n| n.kind() != "identifier") {
                    return Err(AnalysisError::unsupported(
                        "destructuring declaration",
                        declarator.0,
                    ));
                }
                let mut effect = Effect::default();
                if let Some(value) = declarator.field("value") {
                    effect.reads = referenced_variables(value)?;
                }
                effect.write = Assignment::from_node(declarator);
                out.push(effect);
            }
        }
        "expression_statement" => {
            if let Some(expr) = statement.first_named() {
                expression_effects(expr, &mut out)?;
            }
        }
        "empty_statement" => {}
        _ => expression_effects(statement, &mut out)?,
    }
    Ok(out)
}

fn expression_effects<'p>(expr: NodeRef<'p>, out: &mut Vec<Effect<'p>>) -> Result<()> {
    let expr = expr.unparenthesized();
    match expr.kind() {
        "sequence_expression" => {
            for part in expr.named_children() {
                expression_effects(part, out)?;
            }
        }
        "assignment_expression" => {
            let left = expr.field("left").map(NodeRef::unparenthesized);
            let mut reads = match expr.field("right") {
                Some(right) => referenced_variables(right)?,
                None => Vec::new(),
            };
            match left {
                Some(l) if l.kind() == "identifier" => {}
                Some(l) if l.kind().ends_with("_pattern") => {
                    return Err(AnalysisError::unsupported("destructuring assignment", expr.0));
                }
                Some(l) => reads.extend(referenced_variables(l)?),
                None => {}
            }
            out.push(Effect {
                reads,
                write: Assignment::from_node(expr),
            });
        }
        "augmented_assignment_expression" => {
            let mut reads = match expr.field("right") {
                Some(right) => referenced_variables(right)?,
                None => Vec::new(),
            };
            if let Some(left) = expr.field("left") {
                reads.extend(referenced_variables(left)?);
            }
            out.push(Effect {
                reads,
                write: Assignment::from_node(expr),
            });
        }
        "update_expression" => {
            let reads = match expr.field("argument") {
                Some(arg) => referenced_variables(arg)?,
                None => Vec::new(),
            };
            out.push(Effect {
                reads,
                write: Assignment::from_node(expr),
            });
        }
        _ => out.push(Effect {
            reads: referenced_variables(expr)?,
            write: None,
        }),
    }
    Ok(())
}

/// Every variable identifier read by an expression, in document order.
///
/// Writes nested inside a larger expression and function/class expressions
/// are rejected.
pub fn referenced_variables(expr: NodeRef<'_>) -> Result<Vec<NodeRef<'_>>> {
    let mut ids = Vec::new();
    collect_reads(expr, &mut ids)?;
    Ok(ids)
}

fn collect_reads<'p>(node: NodeRef<'p>, ids: &mut Vec<NodeRef<'p>>) -> Result<()> {
    match node.kind() {
        "identifier" | "shorthand_property_identifier" => ids.push(node),
        "assignment_expression" | "augmented_assignment_expression" | "update_expression" => {
            return Err(AnalysisError::unsupported("assignment inside an expression", node.0));
        }
        "function_expression" | "function" | "arrow_function" | "generator_function" | "class" => {
            return Err(AnalysisError::unsupported("function or class expression", node.0));
        }
        "member_expression" => {
            if let Some(object) = node.field("object") {
                collect_reads(object, ids)?;
            }
        }
        _ => {
            for child in node.named_children() {
                collect_reads(child, ids)?;
            }
        }
    }
    Ok(())
}

/// The statement of an `if`'s `else` clause.
pub fn else_statement(if_statement: NodeRef<'_>) -> Option<NodeRef<'_>> {
    let alternative = if_statement.field("alternative")?;
    if alternative.kind() == "else_clause" {
        alternative.first_named()
    } else {
        Some(alternative)
    }
}

/// Clauses of a C-style `for` statement. Absent clauses are `None`.
#[derive(Debug, Clone, Copy)]
pub struct ForClauses<'p> {
    pub initializer: Option<NodeRef<'p>>,
    pub condition: Option<NodeRef<'p>>,
    pub increment: Option<NodeRef<'p>>,
    pub body: Option<NodeRef<'p>>,
}

pub fn for_clauses(node: NodeRef<'_>) -> ForClauses<'_> {
    let present = |n: NodeRef<'_>| n.is_named() && n.kind() != "empty_statement";

    let initializer = node.field("initializer").filter(|n| present(*n));
    let condition = node
        .field("condition")
        .filter(|n| present(*n))
        .and_then(|n| {
            if n.kind() == "expression_statement" {
                n.first_named()
            } else {
                Some(n)
            }
        });
    let increment = node.field("increment").filter(|n| present(*n));

    ForClauses {
        initializer,
        condition,
        increment,
        body: node.field("body"),
    }
}
