//! engine-bridge CLI - Ask the query engine about a schema
//!
//! Usage:
//!   engine-bridge get-config [--schema <file.prisma>] [--ignore-env-var-errors]
//!   engine-bridge get-dmmf [--schema <file.prisma>] [--preview-feature <name>]...
//!   engine-bridge version
//!
//! Without `--schema`, the schema text is read from stdin.
//!
//! Examples:
//!   engine-bridge get-config --schema prisma/schema.prisma
//!   cat prisma/schema.prisma | engine-bridge get-dmmf --engine-type binary
//!   engine-bridge version --engine-path ./query-engine-debian-openssl-3.0.x

use clap::{Args, Parser, Subcommand, ValueEnum};
use engine_bridge::telemetry::init_tracing;
use engine_bridge::{
    get_config, get_dmmf, get_version, EngineContext, EngineError, EngineKind, EngineOptions,
    GetConfigOptions, GetDmmfOptions, InvocationInput, Settings,
};
use serde::Serialize;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

/// Exit code used when the engine itself crashed.
const PANIC_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "engine-bridge")]
#[command(about = "Fetch config, DMMF and version facts from the native query engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    engine: EngineArgs,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct EngineArgs {
    /// Engine kind to use
    #[arg(long, global = true)]
    engine_type: Option<EngineTypeArg>,

    /// Path to the engine executable or library
    #[arg(long, global = true)]
    engine_path: Option<PathBuf>,

    /// Working directory for the engine process
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Warm-up retry budget
    #[arg(long, global = true)]
    retry: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the datasources and generators of a schema
    GetConfig {
        /// Path to the schema file (reads stdin if not specified)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Do not fail on unset env vars referenced by the schema
        #[arg(long)]
        ignore_env_var_errors: bool,
    },

    /// Print the DMMF document of a schema
    GetDmmf {
        /// Path to the schema file (reads stdin if not specified)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Preview feature to enable (repeatable)
        #[arg(long = "preview-feature")]
        preview_features: Vec<String>,
    },

    /// Print the engine version
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineTypeArg {
    Binary,
    Library,
}

impl From<EngineTypeArg> for EngineKind {
    fn from(arg: EngineTypeArg) -> Self {
        match arg {
            EngineTypeArg::Binary => EngineKind::Binary,
            EngineTypeArg::Library => EngineKind::Library,
        }
    }
}

impl From<EngineArgs> for EngineOptions {
    fn from(args: EngineArgs) -> Self {
        EngineOptions {
            engine_path: args.engine_path,
            engine_kind: args.engine_type.map(Into::into),
            cwd: args.cwd,
            retry: args.retry,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_tracing(cli.log_json, level);

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = match EngineContext::from_environment(settings) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = EngineOptions::from(cli.engine);

    match cli.command {
        Commands::GetConfig {
            schema,
            ignore_env_var_errors,
        } => {
            let input = match read_input(schema) {
                Ok(input) => input,
                Err(code) => return code,
            };
            let options = GetConfigOptions::new(input)
                .with_engine(engine)
                .ignore_env_var_errors(ignore_env_var_errors);
            report(get_config(&ctx, &options).await)
        }
        Commands::GetDmmf {
            schema,
            preview_features,
        } => {
            let input = match read_input(schema) {
                Ok(input) => input,
                Err(code) => return code,
            };
            let options = GetDmmfOptions::new(input)
                .with_engine(engine)
                .preview_features(preview_features);
            report(get_dmmf(&ctx, &options).await)
        }
        Commands::Version => match get_version(&ctx, &engine).await {
            Ok(version) => {
                println!("{}", version);
                ExitCode::SUCCESS
            }
            Err(e) => render_error(&e),
        },
    }
}

fn read_input(schema: Option<PathBuf>) -> Result<InvocationInput, ExitCode> {
    if let Some(path) = schema {
        return Ok(InvocationInput::Path(path));
    }

    let mut text = String::new();
    match io::stdin().read_to_string(&mut text) {
        Ok(_) => Ok(InvocationInput::Text(text)),
        Err(e) => {
            eprintln!("Error reading schema from stdin: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn report<T: Serialize>(result: Result<T, EngineError>) -> ExitCode {
    match result {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error serializing result: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => render_error(&e),
    }
}

fn render_error(error: &EngineError) -> ExitCode {
    match error.panic_report() {
        Some(panic) => {
            eprintln!("Oops, an unexpected error occurred in the query engine!");
            eprintln!("{}", panic);
            eprintln!();
            eprintln!("Area: {}", panic.area.as_str());
            if let Some(path) = &panic.schema_path {
                eprintln!("Schema: {}", path.display());
            }
            eprintln!();
            eprintln!("{}", panic.native_stack.trim_end());
            eprintln!();
            eprintln!("Please report this crash together with the output above.");
            ExitCode::from(PANIC_EXIT)
        }
        None => {
            eprintln!("Error: {}", error);
            ExitCode::FAILURE
        }
    }
}
