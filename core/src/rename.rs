//! Identifier resolution: maps every identifier occurrence to a physical name
//! that tells apart shadowed and redeclared variables.

use std::collections::HashMap;

use crate::scope::ScopeStack;
use crate::syntax::{NodeRef, Program};

/// Identifier node -> physical name.
#[derive(Debug, Clone, Default)]
pub struct PhysicalNames<'p> {
    names: HashMap<NodeRef<'p>, String>,
}

impl<'p> PhysicalNames<'p> {
    pub fn get(&self, identifier: NodeRef<'p>) -> Option<&str> {
        self.names.get(&identifier).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeRef<'p>, &str)> {
        self.names.iter().map(|(node, name)| (*node, name.as_str()))
    }
}

/// Resolve every identifier reachable from the program's entry scope.
///
/// The first declaration of `n` is named `n`, later ones `n2`, `n3`, ... in
/// document order. Identifiers with no visible declaration get no entry.
pub fn physical_names(program: &Program) -> PhysicalNames<'_> {
    let mut renamer = Renamer {
        program,
        scope: ScopeStack::new(),
        counts: HashMap::new(),
        names: HashMap::new(),
    };

    let entry = program.entry_scope();
    if let Some(function) = entry.function {
        if let Some(params) = function.field("parameters") {
            renamer.declare_parameters(params);
        }
    }
    for child in entry.body.named_children() {
        renamer.visit(child);
    }

    PhysicalNames {
        names: renamer.names,
    }
}

struct Renamer<'p> {
    program: &'p Program,
    scope: ScopeStack<String>,
    counts: HashMap<String, usize>,
    names: HashMap<NodeRef<'p>, String>,
}

impl<'p> Renamer<'p> {
    fn visit(&mut self, node: NodeRef<'p>) {
        match node.kind() {
            "identifier" | "shorthand_property_identifier" => self.resolve(node),
            "lexical_declaration" | "variable_declaration" => {
                for declarator in node.named_children() {
                    if declarator.kind() == "variable_declarator" {
                        self.visit_declarator(declarator);
                    }
                }
            }
            "statement_block" | "for_statement" => {
                self.scope.push();
                for child in node.named_children() {
                    self.visit(child);
                }
                self.scope.pop();
            }
            _ => {
                for child in node.named_children() {
                    self.visit(child);
                }
            }
        }
    }

    fn visit_declarator(&mut self, declarator: NodeRef<'p>) {
        if let Some(value) = declarator.field("value") {
            self.visit(value);
        }
        match declarator.field("name") {
            Some(name) if name.kind() == "identifier" => self.declare(name),
            Some(pattern) => self.visit(pattern),
            None => {}
        }
    }

    fn declare_parameters(&mut self, params: NodeRef<'p>) {
        for param in params.named_children() {
            let ident = match param.kind() {
                "identifier" => Some(param),
                "required_parameter" | "optional_parameter" => {
                    param.field("pattern").filter(|p| p.kind() == "identifier")
                }
                "assignment_pattern" => param.field("left").filter(|p| p.kind() == "identifier"),
                _ => None,
            };
            if let Some(ident) = ident {
                self.declare(ident);
            }
        }
    }

    fn declare(&mut self, name_node: NodeRef<'p>) {
        let name = self.program.text(name_node).to_string();
        let count = self.counts.entry(name.clone()).or_insert(0);
        *count += 1;
        let physical = if *count == 1 {
            name.clone()
        } else {
            format!("{name}{count}")
        };
        self.scope.bind(name, physical.clone());
        self.names.insert(name_node, physical);
    }

    fn resolve(&mut self, node: NodeRef<'p>) {
        let name = self.program.text(node);
        if let Some(physical) = self.scope.lookup(name) {
            self.names.insert(node, physical.clone());
        }
    }
}
