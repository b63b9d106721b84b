//! Fragment graph compiler and sandbox runner.
//!
//! Provides the `fraglink` binary with three subcommands:
//!
//! - `extract` prints the imports and exported names of one source file
//! - `compile` turns a graph file into a single unit and prints it
//! - `run` compiles a graph file and executes it in the sandbox
//!
//! Graph files are JSON: `{ "fragments": [...], "edges": [...]?, "entryId"? }`.
//! Without `edges`, dependencies are derived from fragment imports.
//!
//! Uses the same `ExecutionService` pipeline as any other front end, so
//! validation and compilation behave identically everywhere.
//!
//! Exit codes: 0 = success, 1 = execution failed, 2 = request rejected,
//! 3 = I/O or configuration error.

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use fraglink_check::{extract_symbols, try_extract_symbols};
use fraglink_codegen::{CompileOptions, HoistMode};
use fraglink_core::{CompileRequest, DependencyEdge, Fragment, FragmentId};
use fraglink_service::{telemetry, ExecutionService, ServiceConfig, ServiceError};

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_REJECTED: i32 = 2;
const EXIT_IO: i32 = 3;

/// Fragment graph compiler and sandbox runner.
#[derive(Parser)]
#[command(name = "fraglink", about = "Compile and run graphs of JavaScript fragments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the imports and exported functions of a source file as JSON.
    Extract {
        /// JavaScript source file.
        file: PathBuf,

        /// Fail with exit code 2 on syntax errors instead of printing empty lists.
        #[arg(long)]
        strict: bool,
    },

    /// Compile a graph into one executable unit.
    Compile {
        #[command(flatten)]
        graph: GraphArgs,

        /// Print the whole compiled unit (order, diagnostics, digest) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compile a graph and execute it in the sandbox.
    Run {
        #[command(flatten)]
        graph: GraphArgs,

        /// Wall-clock limit in milliseconds (overrides FRAGLINK_TIMEOUT_MS).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_ms: Option<u64>,

        /// Memory limit in MiB (overrides FRAGLINK_MEMORY_LIMIT_MB).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        memory_mb: Option<u64>,

        /// Directory of extra `<name>.js` modules to allow (overrides FRAGLINK_MODULE_DIR).
        #[arg(long)]
        modules: Option<PathBuf>,
    },
}

/// Arguments shared by `compile` and `run`.
#[derive(clap::Args)]
struct GraphArgs {
    /// Graph file (JSON).
    #[arg(short, long)]
    graph: PathBuf,

    /// Entry fragment id (default: the file's `entryId`).
    #[arg(short, long)]
    entry: Option<String>,

    /// Hoisting strategy: namespaced or global (default: FRAGLINK_HOIST).
    #[arg(long)]
    hoist: Option<HoistMode>,

    /// Export of the entry fragment to call after loading; its return value
    /// becomes the result.
    #[arg(long)]
    invoke: Option<String>,
}

/// On-disk graph shape. Same as a compile request, with the entry optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphFile {
    fragments: Vec<Fragment>,
    #[serde(default)]
    edges: Option<Vec<DependencyEdge>>,
    #[serde(default)]
    entry_id: Option<FragmentId>,
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Extract { file, strict } => run_extract(&file, strict),
        Commands::Compile { graph, json } => run_compile(&graph, json),
        Commands::Run {
            graph,
            timeout_ms,
            memory_mb,
            modules,
        } => run_execute(&graph, timeout_ms, memory_mb, modules).await,
    };
    process::exit(exit_code);
}

/// Execute the extract subcommand.
fn run_extract(file: &Path, strict: bool) -> i32 {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", file.display(), e);
            return EXIT_IO;
        }
    };

    let symbols = if strict {
        match try_extract_symbols(&source) {
            Ok(symbols) => symbols,
            Err(e) => {
                eprintln!("Error: {}: {}", file.display(), e);
                return EXIT_REJECTED;
            }
        }
    } else {
        extract_symbols(&source)
    };

    print_json(&symbols)
}

/// Execute the compile subcommand.
fn run_compile(args: &GraphArgs, json: bool) -> i32 {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_IO;
        }
    };
    let request = match load_request(args) {
        Ok(request) => request,
        Err(code) => return code,
    };

    // Compiling needs no module allowlist; skip loading the module directory.
    let service = ExecutionService::with_modules(config, Default::default());
    let options = compile_options(args, service.compile_options());

    match service.compile_with(&request, &options) {
        Ok(unit) => {
            for diagnostic in &unit.diagnostics {
                eprintln!("warning: {}", diagnostic);
            }
            if json {
                print_json(&unit)
            } else {
                print!("{}", unit.source);
                EXIT_OK
            }
        }
        Err(e) => report_rejection(&e),
    }
}

/// Execute the run subcommand.
async fn run_execute(
    args: &GraphArgs,
    timeout_ms: Option<u64>,
    memory_mb: Option<u64>,
    modules: Option<PathBuf>,
) -> i32 {
    let mut config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_IO;
        }
    };
    if let Some(ms) = timeout_ms {
        config.limits.timeout = Duration::from_millis(ms);
    }
    if let Some(mb) = memory_mb {
        config.limits.memory_limit = usize::try_from(mb)
            .unwrap_or(usize::MAX)
            .saturating_mul(1024 * 1024);
    }
    if modules.is_some() {
        config.module_dir = modules;
    }

    let request = match load_request(args) {
        Ok(request) => request,
        Err(code) => return code,
    };
    let service = match ExecutionService::new(config) {
        Ok(service) => service,
        Err(e) => return report_rejection(&e),
    };
    let options = compile_options(args, service.compile_options());

    match service.execute_with(request, options).await {
        Ok(response) => {
            for diagnostic in &response.diagnostics {
                eprintln!("warning: {}", diagnostic);
            }
            let printed = print_json(&response);
            if printed != EXIT_OK {
                printed
            } else if response.is_success() {
                EXIT_OK
            } else {
                EXIT_FAILED
            }
        }
        Err(e) => report_rejection(&e),
    }
}

/// Reads the graph file and applies the `--entry` override.
fn load_request(args: &GraphArgs) -> Result<CompileRequest, i32> {
    let text = std::fs::read_to_string(&args.graph).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", args.graph.display(), e);
        EXIT_IO
    })?;
    let file: GraphFile = serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid graph file '{}': {}", args.graph.display(), e);
        EXIT_REJECTED
    })?;

    let entry_id = match (&args.entry, file.entry_id) {
        (Some(entry), _) => FragmentId::from(entry.as_str()),
        (None, Some(entry)) => entry,
        (None, None) => {
            eprintln!("Error: no entry fragment: pass --entry or set entryId in the graph file");
            return Err(EXIT_REJECTED);
        }
    };

    tracing::debug!(
        graph = %args.graph.display(),
        fragments = file.fragments.len(),
        entry = %entry_id,
        "loaded graph file"
    );

    Ok(CompileRequest {
        fragments: file.fragments,
        edges: file.edges,
        entry_id,
    })
}

fn compile_options(args: &GraphArgs, defaults: CompileOptions) -> CompileOptions {
    CompileOptions {
        hoist_mode: args.hoist.unwrap_or(defaults.hoist_mode),
        entry_export: args.invoke.clone(),
        ..defaults
    }
}

fn report_rejection(error: &ServiceError) -> i32 {
    eprintln!("Error [{}]: {}", error.code(), error);
    match error {
        ServiceError::Config(_) => EXIT_IO,
        _ => EXIT_REJECTED,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: failed to serialize output: {}", e);
            EXIT_IO
        }
    }
}
