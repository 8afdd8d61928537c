use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use coderisk_core::{CodeRiskError, Severity};

use coderisk_cli::commands;
use coderisk_cli::context::AppContext;
use coderisk_cli::output::{self, Verbosity};

#[derive(Parser)]
#[command(name = "coderisk")]
#[command(about = "Pre-commit risk checks over a code knowledge graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Run against this directory instead of the current one
    #[arg(long, global = true, env = "CODERISK_DIR")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a repository: clone, fetch history, parse, build the graph
    Init {
        /// Repository URL; defaults to the current repo's origin
        repo: Option<String>,

        /// Skip the forge API and ingest from the local clone only
        #[arg(long)]
        local: bool,
    },

    /// Assess the risk of changed files (working tree, paths, or a ref)
    Check {
        /// Paths or a commit ref (HEAD, sha, A..B); empty = working tree
        args: Vec<String>,

        /// One-line output for hooks
        #[arg(long, conflicts_with_all = ["explain", "ai_mode"])]
        quiet: bool,

        /// Include the hop-by-hop investigation trace
        #[arg(long, conflicts_with_all = ["quiet", "ai_mode"])]
        explain: bool,

        /// Emit one machine-readable JSON document
        #[arg(long = "ai-mode", conflicts_with_all = ["quiet", "explain"])]
        ai_mode: bool,
    },

    /// Manage incidents linked to files
    #[command(subcommand)]
    Incident(IncidentCommands),

    /// Manage the pre-commit hook
    #[command(subcommand)]
    Hook(HookCommands),
}

#[derive(Subcommand)]
enum IncidentCommands {
    /// Record a new incident
    Create {
        #[arg(long)]
        title: String,

        #[arg(long, value_parser = parse_severity)]
        severity: Severity,

        #[arg(long)]
        description: Option<String>,
    },

    /// Link an incident to a file
    Link {
        /// Incident id (uuid)
        id: String,

        /// Git-relative file path
        path: String,

        #[arg(long)]
        line: Option<u32>,

        #[arg(long)]
        function: Option<String>,
    },

    /// Full-text search over recorded incidents
    Search { query: String },
}

#[derive(Subcommand)]
enum HookCommands {
    /// Install the pre-commit hook
    Install {
        #[arg(long)]
        force: bool,
    },

    /// Remove the hook (only if we installed it)
    Uninstall,

    /// Record a --no-verify override in the audit log
    Override {
        #[arg(long)]
        justification: Option<String>,
    },
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CODERISK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start_dir = cli
        .dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let result = run(cli, start_dir).await;
    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{}", format!("error: {}", e).red());
            // tool errors exit 10 so pre-commit hooks fail open
            ExitCode::from(10)
        }
    }
}

async fn run(cli: Cli, start_dir: PathBuf) -> Result<i32, CodeRiskError> {
    match cli.command {
        Commands::Init { repo, local } => {
            let ctx = AppContext::for_repo(&start_dir, repo.as_deref())?;
            commands::init::run(ctx, local).await
        }
        Commands::Check {
            args,
            quiet,
            explain,
            ai_mode,
        } => {
            let verbosity = if quiet {
                Verbosity::Quiet
            } else if explain {
                Verbosity::Explain
            } else if ai_mode {
                Verbosity::AiMode
            } else {
                output::detect_verbosity()
            };
            let ctx = AppContext::for_repo(&start_dir, None)?;
            commands::check::run(ctx, args, verbosity).await
        }
        Commands::Incident(cmd) => {
            let ctx = AppContext::for_repo(&start_dir, None)?;
            match cmd {
                IncidentCommands::Create {
                    title,
                    severity,
                    description,
                } => commands::incident::create(ctx, title, severity, description).await,
                IncidentCommands::Link {
                    id,
                    path,
                    line,
                    function,
                } => commands::incident::link(ctx, id, path, line, function).await,
                IncidentCommands::Search { query } => commands::incident::search(ctx, query),
            }
        }
        Commands::Hook(cmd) => {
            let ctx = AppContext::for_repo(&start_dir, None)?;
            match cmd {
                HookCommands::Install { force } => commands::hook::install(ctx, force),
                HookCommands::Uninstall => commands::hook::uninstall(ctx),
                HookCommands::Override { justification } => {
                    commands::hook::record_override(ctx, justification)
                }
            }
        }
    }
}
