use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use alchemy_analysis::{Compiler, CompilerOptions};

/// Alchemy compiler frontend.
#[derive(Debug, Parser)]
#[command(name = "alchemyc", version, about)]
struct Args {
    /// Package roots as `name=directory`; may be repeated. The first
    /// package is the root package unless --root-package is given.
    #[arg(long = "package", value_name = "NAME=DIR")]
    packages: Vec<String>,

    /// Entry-point patterns (`[Package::...::]Name[.Method]`).
    #[arg(long = "entry", value_name = "PATTERN")]
    entry_points: Vec<String>,

    /// Root package name for unqualified entry-point patterns.
    #[arg(long)]
    root_package: Option<String>,

    /// Extra worker threads (0 runs everything on the submitting thread).
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Optional TOML file with a serialized CompilerOptions.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit diagnostics and code-gen output as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str::<CompilerOptions>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => CompilerOptions::default(),
    };

    options.worker_threads = args.threads;
    if let Some(root) = &args.root_package {
        options.root_package = root.clone();
    }
    options.entry_points.extend(args.entry_points.clone());

    let mut compiler = Compiler::new(options);
    for package in &args.packages {
        let Some((name, directory)) = package.split_once('=') else {
            bail!("package `{package}` must be written as name=directory");
        };
        compiler.add_package(name, directory);
    }

    let result = compiler.compile().context("compilation failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.diagnostics)?);
    } else {
        for diagnostic in &result.diagnostics {
            eprintln!(
                "{} ({}:{}) {}",
                diagnostic.file_path, diagnostic.line, diagnostic.column, diagnostic.message
            );
        }
        log::info!(
            "{} entry points, {} outputs, {} touched types",
            result.entry_points.len(),
            result.outputs.len(),
            result.touched_type_count
        );
        for output in &result.outputs {
            println!("{}", output.text);
        }
    }

    if !result.diagnostics.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
