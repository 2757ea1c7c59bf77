use std::collections::HashSet;

use flowscope_core::{AnalysisError, BlockId, Cfg, Dialect, Program, SimplifyOptions, Transition};
use pretty_assertions::assert_eq;

fn parse(src: &str) -> Program {
    Program::parse(src, Dialect::TypeScript).unwrap()
}

fn label_of(cfg: &Cfg<'_>, id: BlockId) -> String {
    cfg.block(id).label.clone()
}

/// Labels reached from `label` through each outgoing edge kind.
fn edges_of(cfg: &Cfg<'_>, label: &str) -> Vec<(&'static str, String)> {
    let block = cfg.find(label).unwrap_or_else(|| panic!("no block {label}:\n{cfg}"));
    block
        .end
        .edges()
        .into_iter()
        .map(|(kind, id)| (kind, label_of(cfg, id)))
        .collect()
}

/// Statement texts along the path that always takes the first edge, until a
/// block repeats or the path ends.
fn first_edge_path(cfg: &Cfg<'_>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut current = Some(cfg.entry());
    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        let block = cfg.block(id);
        out.extend(
            block
                .statements
                .iter()
                .map(|s| cfg.program().text(*s).to_string()),
        );
        current = block.end.successors().first().copied();
    }
    out
}

const PROGRAMS: &[&str] = &[
    "let a = 1\nlet b = a\n",
    "let x = 1\nif (x == 1) {\n  x = 2\n} else {\n  x = 3\n}\nlog(x)\n",
    "while (true) {\n  if (isReady) break\n  tick()\n}\ndone()\n",
    "for (let i = 0; i < 10; i++) {\n  console.log(i)\n}\n",
    "let x = 5\ndo {\n  x -= 1\n  if (x == 2) continue\n  log(x)\n} while (x > 0)\n",
    "for (;;) {\n  if (a) {\n    break\n  }\n}\nb = 1\n",
    "function f(n) {\n  let s = 0\n  while (n > 0) {\n    s += n\n    n--\n  }\n  return s\n}\n",
];

#[test]
fn break_jumps_straight_past_the_loop() {
    let program = parse("while (true) {\n  if (isReady) break\n  tick()\n}\ndone()\n");
    let mut cfg = Cfg::build(&program).unwrap();

    assert_eq!(
        edges_of(&cfg, "while3"),
        vec![("then", "loop4".to_string()), ("else", "next2".to_string())]
    );
    assert_eq!(
        edges_of(&cfg, "then6"),
        vec![("then", "next2".to_string()), ("else", "dead8".to_string())]
    );

    cfg.eliminate_empty_jumps().unwrap();
    cfg.validate().unwrap();
    assert_eq!(label_of(&cfg, cfg.entry()), "while3");
    assert_eq!(edges_of(&cfg, "then6")[0], ("then", "next2".to_string()));
    assert!(cfg.find("else7").is_none());

    cfg.eliminate_true_branches().unwrap();
    assert_eq!(edges_of(&cfg, "then6"), vec![("jump", "next2".to_string())]);
    assert_eq!(edges_of(&cfg, "while3"), vec![("jump", "loop4".to_string())]);
    let next = cfg.find("next2").unwrap();
    assert_eq!(next.parents().len(), 1);
    assert!(cfg.find("dead8").is_none());
}

#[test]
fn for_loop_links_init_condition_body_and_increment() {
    let program = parse("for (let i = 0; i < 10; i++) {\n  console.log(i)\n}\n");
    let cfg = Cfg::build(&program).unwrap();

    assert_eq!(edges_of(&cfg, "start1"), vec![("jump", "init4".to_string())]);
    assert_eq!(edges_of(&cfg, "init4"), vec![("jump", "for3".to_string())]);
    assert_eq!(
        edges_of(&cfg, "for3"),
        vec![("then", "body6".to_string()), ("else", "next2".to_string())]
    );
    assert_eq!(edges_of(&cfg, "body6"), vec![("jump", "incr5".to_string())]);
    assert_eq!(edges_of(&cfg, "incr5"), vec![("jump", "for3".to_string())]);
    assert_eq!(cfg.end_text(cfg.find("next2").unwrap().id), "halt");

    let init = cfg.find("init4").unwrap();
    assert!(program.text(init.statements[0]).starts_with("let i = 0"));
    let incr = cfg.find("incr5").unwrap();
    assert_eq!(program.text(incr.statements[0]), "i++");
    let Transition::Branch { condition, .. } = cfg.find("for3").unwrap().end else {
        panic!("for3 should branch:\n{cfg}");
    };
    assert_eq!(cfg.condition_text(condition), "i < 10");

    let cond = cfg.find("for3").unwrap();
    let parents: HashSet<String> = cond.parents().iter().map(|p| label_of(&cfg, *p)).collect();
    assert_eq!(
        parents,
        HashSet::from(["init4".to_string(), "incr5".to_string()])
    );
}

#[test]
fn for_loop_without_condition_branches_on_true() {
    let program = parse("for (;;) {\n  tick()\n}\n");
    let cfg = Cfg::build(&program).unwrap();
    let cond = cfg.find("for3").unwrap();
    assert_eq!(cfg.end_text(cond.id), "jump if (true) to body6 else next2");
}

#[test]
fn break_without_loop_is_an_error() {
    let program = parse("let a = 1\nif (a) {\n  break\n}\n");
    let err = Cfg::build(&program).unwrap_err();
    assert!(
        matches!(err, AnalysisError::NoEnclosingLoop { keyword: "break", line: 3 }),
        "{err:?}"
    );

    let program = parse("continue\n");
    let err = Cfg::build(&program).unwrap_err();
    assert!(
        matches!(err, AnalysisError::NoEnclosingLoop { keyword: "continue", line: 1 }),
        "{err:?}"
    );
    assert!(err.to_string().contains("outside of an enclosing loop"));
}

#[test]
fn unsupported_constructs_fail_fast() {
    for src in [
        "switch (a) {\n  case 1:\n    b()\n}\n",
        "try {\n  a()\n} catch (e) {}\n",
        "throw err\n",
        "outer: while (a) {\n  break outer\n}\n",
        "for (const x of xs) {}\n",
        "if (a) {\n  function g() {}\n}\n",
    ] {
        let program = parse(src);
        let err = Cfg::build(&program).unwrap_err();
        assert!(matches!(err, AnalysisError::Unsupported { .. }), "{src}: {err:?}");
    }
}

#[test]
fn syntax_errors_are_reported_with_position() {
    let err = Program::parse("let = = 1\n", Dialect::JavaScript).unwrap_err();
    assert!(matches!(err, AnalysisError::Syntax { line: 1, .. }), "{err:?}");
}

#[test]
fn every_pass_keeps_the_graph_well_formed() {
    for src in PROGRAMS {
        let program = parse(src);
        let mut cfg = Cfg::build(&program).unwrap();
        cfg.validate().unwrap();
        for pass in ["empty jumps", "true branches", "jump chains", "split"] {
            let result = match pass {
                "empty jumps" => cfg.eliminate_empty_jumps(),
                "true branches" => cfg.eliminate_true_branches(),
                "jump chains" => cfg.merge_jump_chains(),
                _ => cfg.split(),
            };
            result.unwrap_or_else(|e| panic!("{pass} on {src}: {e}"));
            cfg.validate().unwrap();
            for block in cfg.blocks() {
                assert_ne!(block.end, Transition::Unset, "{src}\n{cfg}");
            }
        }
    }
}

#[test]
fn passes_preserve_statement_order_along_paths() {
    for src in PROGRAMS {
        let program = parse(src);
        let mut cfg = Cfg::build(&program).unwrap();
        let before = first_edge_path(&cfg);
        let count = cfg.statement_count();

        cfg.eliminate_empty_jumps().unwrap();
        assert_eq!(first_edge_path(&cfg), before, "empty jumps: {src}");
        cfg.eliminate_true_branches().unwrap();
        assert_eq!(first_edge_path(&cfg), before, "true branches: {src}");
        cfg.merge_jump_chains().unwrap();
        assert_eq!(first_edge_path(&cfg), before, "jump chains: {src}");
        cfg.split().unwrap();
        assert_eq!(first_edge_path(&cfg), before, "split: {src}");
        assert!(cfg.blocks().all(|b| b.statements.len() <= 1));
        assert!(cfg.statement_count() <= count);
    }
}

#[test]
fn simplify_runs_enabled_passes_in_order() {
    let program = parse("let x = 1\nif (x == 1) {\n  x = 2\n} else {\n  x = 3\n}\nlog(x)\n");
    let mut cfg = Cfg::build(&program).unwrap();
    cfg.simplify(&SimplifyOptions {
        merge_jump_chains: true,
        ..SimplifyOptions::default()
    })
    .unwrap();
    assert_eq!(
        cfg.to_string(),
        "start1:\n  let x = 1\n  jump if (x == 1) to then3 else else4\n\
         then3:\n  x = 2\n  jump to next2\n\
         else4:\n  x = 3\n  jump to next2\n\
         next2:\n  log(x)\n  halt\n"
    );
}

#[test]
fn merge_folds_do_while_condition_into_body() {
    let program = parse("do {\n  a--\n} while (a)\nb = 1\n");
    let mut cfg = Cfg::build(&program).unwrap();
    cfg.simplify(&SimplifyOptions {
        merge_jump_chains: true,
        ..SimplifyOptions::default()
    })
    .unwrap();
    assert_eq!(
        cfg.to_string(),
        "do4:\n  a--\n  jump if (a) to do4 else next2\n\
         next2:\n  b = 1\n  halt\n"
    );
    let body = cfg.find("do4").unwrap();
    assert!(body.parents().contains(&body.id));
}

#[test]
fn unsimplified_dump_keeps_empty_blocks() {
    let program = parse("while (a) {\n  a--\n}\n");
    let mut cfg = Cfg::build(&program).unwrap();
    cfg.simplify(&SimplifyOptions::none()).unwrap();
    assert_eq!(
        cfg.to_string(),
        "start1:\n  jump to while3\n\
         while3:\n  jump if (a) to loop4 else next2\n\
         loop4:\n  a--\n  jump to while3\n\
         next2:\n  halt\n"
    );
}
