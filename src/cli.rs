//! CLI: type graph document → (ruby | check)
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::codegen::{RubyOptions, render_ruby};
use crate::ir::{TypeGraph, TypeRef};
use crate::runtime;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// emit a dry-struct Ruby module for a type graph, or check JSON samples against it
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,

    /// log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// emit the Ruby module
    Ruby(RubyOut),
    /// decode, re-encode and compare JSON samples the way the generated code would
    Check(CheckSamples),
}

#[derive(Args, Debug, Clone)]
struct GraphSettings {
    /// type graph document (.json)
    #[arg(long, short)]
    input: PathBuf,
}

#[derive(clap::Parser, Debug)]
struct RubyOut {
    #[command(flatten)]
    graph_settings: GraphSettings,

    /// output .rb file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// only declare the types, without JSON marshaling
    #[arg(long)]
    just_types: bool,

    /// replaces the default header comment; repeat for several lines
    #[arg(long = "leading-comment")]
    leading_comments: Vec<String>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct CheckSamples {
    #[command(flatten)]
    graph_settings: GraphSettings,

    /// One or more samples. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    samples: Vec<String>,

    /// top-level to check against (required when the graph has several)
    #[arg(long)]
    top_level: Option<String>,

    /// treat samples as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl GraphSettings {
    fn load(&self) -> anyhow::Result<TypeGraph> {
        let source = std::fs::read_to_string(&self.input)
            .with_context(|| format!("failed to read type graph {}", self.input.display()))?;
        crate::path_de::graph_from_str(&source)
            .with_context(|| format!("failed to load type graph {}", self.input.display()))
    }
}

impl CheckSamples {
    fn load_process(&self, mut apply: impl FnMut(String, serde_json::Value)) -> anyhow::Result<()> {
        let source_paths = resolve_file_path_patterns(&self.samples)?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read sample {source_path_str}"))?;
            if !self.ndjson {
                let json_value = serde_json::from_str::<serde_json::Value>(&source)
                    .with_context(|| format!("failed to parse JSON sample ({source_path_str})"))?;
                apply(source_path_str, json_value);
                continue;
            }
            for (line_no, line) in source.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let label = format!("{source_path_str}:{}", line_no + 1);
                let json_value = serde_json::from_str::<serde_json::Value>(line)
                    .with_context(|| format!("failed to parse JSON sample ({label})"))?;
                apply(label, json_value);
            }
        }
        Ok(())
    }

    fn target(&self, graph: &TypeGraph) -> anyhow::Result<TypeRef> {
        if let Some(name) = self.top_level.as_deref() {
            return Ok(graph.top_level(name)?);
        }
        let mut top_levels = graph.top_levels();
        match (top_levels.next(), top_levels.next()) {
            (Some((_, r)), None) => Ok(r),
            (None, _) => bail!("the type graph declares no top-levels"),
            (Some(_), Some(_)) => bail!("the type graph declares several top-levels; pick one with --top-level"),
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn run(&self) -> anyhow::Result<ExitCode> {
        match &self.cmd {
            Command::Ruby(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(ExitCode::SUCCESS);
                }

                let graph = target.graph_settings.load()?;
                let options = RubyOptions {
                    just_types: target.just_types,
                    leading_comments: (!target.leading_comments.is_empty())
                        .then(|| target.leading_comments.clone()),
                };
                let ruby_src = render_ruby(&graph, options)?;

                match target.out.as_ref() {
                    Some(out) => write_output(out, &ruby_src)?,
                    None => print!("{ruby_src}"),
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Check(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(ExitCode::SUCCESS);
                }

                let graph = target.graph_settings.load()?;
                let top_level = target.target(&graph)?;

                let mut total = 0usize;
                let mut failed = 0usize;
                target.load_process(|label, value| {
                    total += 1;
                    match check_sample(&graph, top_level, &value) {
                        Ok(()) => println!("{}", format!("✅ {label}").green()),
                        Err(reason) => {
                            failed += 1;
                            println!("{}", format!("❌ {label}: {reason}").red());
                        }
                    }
                })?;

                tracing::info!(total, failed, "checked samples");
                println!("{}/{total} samples passed", total - failed);
                Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Decode then re-encode one sample; the reason is user-facing.
pub fn check_sample(graph: &TypeGraph, top_level: TypeRef, value: &serde_json::Value) -> Result<(), String> {
    let typed = runtime::decode(graph, top_level, value).map_err(|error| error.to_string())?;
    let encoded = typed.to_dynamic();
    if !runtime::round_trips(value, &encoded) {
        tracing::debug!(%encoded, "re-encoded sample differs");
        return Err("decoded, but does not re-encode to the same JSON".to_string());
    }
    Ok(())
}

fn write_output(out: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // explicit glob that matched nothing
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
