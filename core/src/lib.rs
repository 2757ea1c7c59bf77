//! Control-flow and data-dependency analysis for JavaScript and TypeScript
//! statement fragments.
//!
//! The pipeline parses a fragment ([`Program`]), builds a [`Cfg`] of basic
//! blocks, optionally simplifies it, resolves identifiers to physical names
//! and computes reaching definitions ([`Ddg`]). Presentation helpers in
//! [`graph`] turn the results into node/edge lists or Mermaid.

pub mod cfg;
pub mod config;
pub mod ddg;
pub mod error;
pub mod graph;
mod lexical;
pub mod rename;
pub mod scope;
pub mod simplify;
pub mod syntax;
pub mod visit;

use tracing::debug;

pub use cfg::{BasicBlock, BlockId, Cfg, Condition, Transition};
pub use config::AnalysisConfig;
pub use ddg::{Assignment, AssignmentKind, Ddg, DEFAULT_MAX_VISITS, UNKNOWN};
pub use error::{AnalysisError, CfgDefect, Result};
pub use graph::{block_dependencies, BlockDependencies, EdgeLabel, GraphEdge, GraphNode, Projection};
pub use rename::{physical_names, PhysicalNames};
pub use simplify::SimplifyOptions;
pub use syntax::{Dialect, NodeRef, Program};

/// Everything computed for one program.
#[derive(Debug, Clone)]
pub struct Analysis<'p> {
    /// The CFG after the configured passes.
    pub cfg: Cfg<'p>,
    pub names: PhysicalNames<'p>,
    /// Flow-sensitive, or lexical when built by [`analyze_lexical`].
    pub ddg: Ddg<'p>,
}

impl<'p> Analysis<'p> {
    /// Graph projection, with `depends` edges when the config asks for them.
    pub fn projection(&self, config: &AnalysisConfig) -> Projection {
        let ddg = config.depends_edges.then_some(&self.ddg);
        Projection::new(&self.cfg, ddg)
    }

    pub fn block_dependencies(&self) -> BlockDependencies {
        graph::block_dependencies(&self.cfg, &self.ddg)
    }
}

/// Build, simplify and analyze `program` with the flow-sensitive DDG.
pub fn analyze<'p>(program: &'p Program, config: &AnalysisConfig) -> Result<Analysis<'p>> {
    let mut cfg = Cfg::build(program)?;
    cfg.simplify(&config.simplify)?;
    let names = physical_names(program);
    let ddg = Ddg::build(&cfg, &names, config.max_visits)?;
    debug!(
        blocks = cfg.order().len(),
        names = names.len(),
        truncated = ddg.truncated(),
        "analysis complete"
    );
    Ok(Analysis { cfg, names, ddg })
}

/// Like [`analyze`], but with the lexical (flow-insensitive) DDG.
pub fn analyze_lexical<'p>(program: &'p Program, config: &AnalysisConfig) -> Result<Analysis<'p>> {
    let mut cfg = Cfg::build(program)?;
    cfg.simplify(&config.simplify)?;
    let names = physical_names(program);
    let ddg = Ddg::lexical(program)?;
    Ok(Analysis { cfg, names, ddg })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_runs_default_pipeline() {
        let program = Program::parse("let a = 1\nwhile (a < 3) {\n  a++\n}\n", Dialect::TypeScript)
            .unwrap();
        let analysis = analyze(&program, &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.cfg.block(analysis.cfg.entry()).label, "start1");
        assert!(!analysis.ddg.truncated());
        assert!(!analysis.names.is_empty());
    }

    #[test]
    fn test_projection_respects_depends_toggle() {
        let program = Program::parse("let a = 1\nlet b = a\n", Dialect::TypeScript).unwrap();
        let mut config = AnalysisConfig::default();
        let analysis = analyze(&program, &config).unwrap();
        assert!(analysis
            .projection(&config)
            .edges
            .iter()
            .any(|e| e.label == EdgeLabel::Depends));

        config.depends_edges = false;
        assert!(analysis.projection(&config).edges.is_empty());
    }

    #[test]
    fn test_block_dependencies_follow_loop_back_edge() {
        let program = Program::parse("let a = 1\nwhile (a < 3) {\n  a++\n}\n", Dialect::TypeScript)
            .unwrap();
        let analysis = analyze(&program, &AnalysisConfig::default()).unwrap();
        let deps = analysis.block_dependencies();
        assert!(deps["while3"].contains("start1"));
        assert!(deps["while3"].contains("loop4"));
    }
}
