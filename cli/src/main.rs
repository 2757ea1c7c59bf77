use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use console::style;
use flowscope_core::{analyze, analyze_lexical, AnalysisConfig, Dialect, Program};
use tracing_subscriber::EnvFilter;

/// Control-flow and data-dependency graphs for JS/TS fragments.
#[derive(Debug, Parser)]
#[command(
    name = "flowscope",
    about = "Print the CFG and reaching definitions of a JavaScript or TypeScript fragment."
)]
struct Args {
    /// Path to config file (YAML). Defaults to flowscope.yml if present.
    #[arg(long, default_value = "flowscope.yml")]
    config: PathBuf,

    /// Grammar to parse with. Overrides the config; guessed from the file
    /// extension when neither is given.
    #[arg(long, value_enum)]
    dialect: Option<DialectArg>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Split blocks into one statement each.
    #[arg(long, action = ArgAction::SetTrue)]
    split: bool,

    /// Fold single-parent jump chains.
    #[arg(long, action = ArgAction::SetTrue)]
    merge_chains: bool,

    /// Skip every simplification pass.
    #[arg(long, action = ArgAction::SetTrue)]
    no_simplify: bool,

    /// Use the flow-insensitive lexical DDG.
    #[arg(long, action = ArgAction::SetTrue)]
    lexical: bool,

    /// Leave `depends` edges out of json and mermaid output.
    #[arg(long, action = ArgAction::SetTrue)]
    no_depends: bool,

    /// Set config overrides (repeatable as key=value). Example: --set max_visits=50
    #[arg(long = "set", value_name = "KEY=VALUE")]
    sets: Vec<String>,

    /// Source file to analyze.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// CFG dump followed by the nested DDG dump.
    Text,
    /// CFG dump followed by one line per dependency.
    Flat,
    /// Graph projection as JSON.
    Json,
    /// Graph projection as a Mermaid flowchart.
    Mermaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DialectArg {
    Typescript,
    Javascript,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Typescript => Dialect::TypeScript,
            DialectArg::Javascript => Dialect::JavaScript,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let cfg = effective_config(&args)?;
    tracing::debug!(?cfg, "effective configuration");

    let source = fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let program = Program::parse(source, cfg.dialect)
        .with_context(|| format!("Failed to parse {}", args.path.display()))?;

    let analysis = if args.lexical {
        analyze_lexical(&program, &cfg)
    } else {
        analyze(&program, &cfg)
    }
    .with_context(|| format!("Analysis of {} failed", args.path.display()))?;

    match args.format {
        Format::Text | Format::Flat => {
            println!("{}", style("Control flow:").bold());
            print!("{}", analysis.cfg);
            println!();
            println!("{}", style("Data dependencies:").bold());
            let ddg = if args.format == Format::Text {
                analysis.ddg.to_text()
            } else {
                analysis.ddg.to_flat_text()
            };
            if ddg.is_empty() {
                println!("  {}", style("none").green());
            } else {
                print!("{ddg}");
            }
            if analysis.ddg.truncated() {
                eprintln!(
                    "{} fixpoint stopped after {} visits; dependencies may be incomplete",
                    style("warning:").yellow().bold(),
                    cfg.max_visits
                );
            }
        }
        Format::Json => {
            println!("{}", analysis.projection(&cfg).to_json()?);
        }
        Format::Mermaid => {
            println!("{}", analysis.projection(&cfg).to_mermaid());
        }
    }

    Ok(())
}

/// Config file, then `--set` overrides, then flags. The dialect is guessed
/// from the file extension only when none of them named one.
fn effective_config(args: &Args) -> anyhow::Result<AnalysisConfig> {
    let (mut cfg, file_sets_dialect) = load_config(&args.config)?;
    let sets_dialect = apply_overrides(&mut cfg, &args.sets)?;
    apply_flags(&mut cfg, args);
    if args.dialect.is_none() && !file_sets_dialect && !sets_dialect {
        if let Some(guess) = dialect_for_path(&args.path) {
            cfg.dialect = guess;
        }
    }
    Ok(cfg)
}

/// Read the YAML config when it exists. The flag says whether the file set
/// `dialect` itself.
fn load_config(path: &Path) -> anyhow::Result<(AnalysisConfig, bool)> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok((AnalysisConfig::default(), false));
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse YAML {}", path.display()))?;
    let sets_dialect = value.get("dialect").is_some();
    let cfg: AnalysisConfig = serde_yaml::from_value(value)
        .with_context(|| format!("Invalid config structure in {}", path.display()))?;
    Ok((cfg, sets_dialect))
}

/// Returns whether one of the overrides set `dialect`.
fn apply_overrides(cfg: &mut AnalysisConfig, sets: &[String]) -> anyhow::Result<bool> {
    let mut sets_dialect = false;
    for kv in sets {
        let Some((key, val)) = kv.split_once('=') else {
            bail!("override `{kv}` is not of the form key=value");
        };
        let (key, val) = (key.trim(), val.trim());
        let flag = || matches!(val, "true" | "1" | "yes");
        match key {
            "max_visits" => {
                cfg.max_visits = val
                    .parse::<usize>()
                    .with_context(|| format!("max_visits must be a number, got `{val}`"))?;
            }
            "depends_edges" => cfg.depends_edges = flag(),
            "dialect" => {
                cfg.dialect = match val.to_lowercase().as_str() {
                    "typescript" | "ts" => Dialect::TypeScript,
                    "javascript" | "js" => Dialect::JavaScript,
                    other => bail!("unknown dialect `{other}`"),
                };
                sets_dialect = true;
            }
            "simplify.eliminate_empty_jumps" => cfg.simplify.eliminate_empty_jumps = flag(),
            "simplify.eliminate_true_branches" => cfg.simplify.eliminate_true_branches = flag(),
            "simplify.merge_jump_chains" => cfg.simplify.merge_jump_chains = flag(),
            "simplify.split" => cfg.simplify.split = flag(),
            other => bail!("unknown config key `{other}`"),
        }
    }
    Ok(sets_dialect)
}

fn apply_flags(cfg: &mut AnalysisConfig, args: &Args) {
    if let Some(dialect) = args.dialect {
        cfg.dialect = dialect.into();
    }
    if args.no_simplify {
        cfg.simplify = flowscope_core::SimplifyOptions::none();
    }
    if args.merge_chains {
        cfg.simplify.merge_jump_chains = true;
    }
    if args.split {
        cfg.simplify.split = true;
    }
    if args.no_depends {
        cfg.depends_edges = false;
    }
}

fn dialect_for_path(path: &Path) -> Option<Dialect> {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => match ext.to_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Some(Dialect::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Dialect::JavaScript),
            _ => None,
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("flowscope").chain(argv.iter().copied()))
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&["--split", "--no-depends", "--dialect", "javascript", "a.js"]);
        let mut cfg = AnalysisConfig::default();
        apply_flags(&mut cfg, &args);
        assert!(cfg.simplify.split);
        assert!(!cfg.depends_edges);
        assert_eq!(cfg.dialect, Dialect::JavaScript);
    }

    #[test]
    fn test_no_simplify_disables_all_passes() {
        let args = parse(&["--no-simplify", "a.ts"]);
        let mut cfg = AnalysisConfig::default();
        apply_flags(&mut cfg, &args);
        assert_eq!(cfg.simplify, flowscope_core::SimplifyOptions::none());
    }

    #[test]
    fn test_set_overrides() {
        let mut cfg = AnalysisConfig::default();
        apply_overrides(
            &mut cfg,
            &["max_visits=7".to_string(), "simplify.split=true".to_string()],
        )
        .unwrap();
        assert_eq!(cfg.max_visits, 7);
        assert!(cfg.simplify.split);
        assert!(apply_overrides(&mut cfg, &["bogus=1".to_string()]).is_err());
    }

    #[test]
    fn test_set_dialect_beats_extension_guess() {
        let args = parse(&[
            "--config",
            "missing-flowscope.yml",
            "--set",
            "dialect=javascript",
            "a.ts",
        ]);
        assert_eq!(effective_config(&args).unwrap().dialect, Dialect::JavaScript);

        let args = parse(&["--config", "missing-flowscope.yml", "a.js"]);
        assert_eq!(effective_config(&args).unwrap().dialect, Dialect::JavaScript);

        let args = parse(&[
            "--config",
            "missing-flowscope.yml",
            "--set",
            "dialect=ts",
            "a.js",
        ]);
        assert_eq!(effective_config(&args).unwrap().dialect, Dialect::TypeScript);
    }

    #[test]
    fn test_dialect_from_extension() {
        assert_eq!(dialect_for_path(Path::new("x.mjs")), Some(Dialect::JavaScript));
        assert_eq!(dialect_for_path(Path::new("x.ts")), Some(Dialect::TypeScript));
        assert_eq!(dialect_for_path(Path::new("x.txt")), None);
    }
}
