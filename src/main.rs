use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use coderun::config::Config;
use coderun::logging;

mod commands;

#[derive(Parser)]
#[command(name = "coderun")]
#[command(
    author,
    version,
    about = "Run untrusted code in ephemeral, isolated Docker sandboxes"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./coderun.toml)
    #[arg(long, global = true, env = "CODERUN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default coderun.toml in the current directory
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Execute a source file in a sandbox
    Exec {
        /// Source file to run
        file: PathBuf,

        /// Text passed to the program on stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Timeout in seconds (overrides the configured default)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a solution against a JSON test suite
    Test {
        /// Source file defining the entry point
        file: PathBuf,

        /// JSON file with a list of test cases or {"test_cases": [...]}
        #[arg(long)]
        cases: PathBuf,

        /// Print the suite result as JSON
        #[arg(long)]
        json: bool,

        /// Include input and output of hidden test cases
        #[arg(long)]
        show_hidden: bool,
    },

    /// Remove sandboxes left behind by crashed runs
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init must work even when the existing config is broken
    let config = match cli.command {
        Commands::Init { .. } => Config::default(),
        _ => commands::load_config(cli.config.as_deref())?,
    };
    let _log_guard = logging::init(cli.verbose, &config.logging)?;

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Exec {
            file,
            input,
            timeout,
            json,
        } => {
            let options = commands::exec::ExecOptions {
                input,
                timeout_secs: timeout,
                json,
            };
            commands::exec::run(&config, &file, options).await?;
        }
        Commands::Test {
            file,
            cases,
            json,
            show_hidden,
        } => {
            let options = commands::test::TestOptions { json, show_hidden };
            commands::test::run(&config, &file, &cases, options).await?;
        }
        Commands::Clean => {
            commands::clean::run(&config).await?;
        }
    }

    Ok(())
}
