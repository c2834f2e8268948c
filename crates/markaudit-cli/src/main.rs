// Copyright 2026 markaudit contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use markaudit::StrategyKind;
use markaudit_cli::cli::{self, audit_cmd::RunArgs, output};

#[derive(Parser)]
#[command(
    name = "markaudit",
    about = "markaudit — check that trademark terms carry their ® / ™ symbol on first prominent use",
    version,
    after_help = "Run 'markaudit <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every URL and audit its trademark symbols
    Run(RunArgs),
    /// Check the input files without launching a browser
    Validate {
        /// CSV file with a `url` header column
        #[arg(long)]
        urls_file: PathBuf,
        /// JSON file of trademark terms
        #[arg(long, visible_alias = "terms-file")]
        marks_file: PathBuf,
        /// Prominence strategy to validate against
        #[arg(long)]
        strategy: Option<StrategyKind>,
    },
    /// Check that a Chromium binary can be found
    Doctor {
        /// Chromium binary to check instead of auto-discovery
        #[arg(long)]
        chromium: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(output::QUIET_ENV, "1");
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => cli::audit_cmd::run(args).await,
        Commands::Validate {
            urls_file,
            marks_file,
            strategy,
        } => cli::validate_cmd::run(&urls_file, &marks_file, strategy).map(|()| 0),
        Commands::Doctor { chromium } => cli::doctor::run(chromium.as_deref()).map(|()| 0),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "markaudit", &mut std::io::stdout());
            Ok(0)
        }
    };

    // Exit codes: 0=success, 1=error, 130=interrupted
    let code = match result {
        Ok(code) => code,
        Err(e) => {
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                }));
            } else {
                eprintln!("  Error: {e:#}");
            }
            cli::audit_cmd::EXIT_FAILURE
        }
    };
    std::process::exit(code);
}
