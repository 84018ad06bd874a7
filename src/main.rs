//! # fixpair CLI
//!
//! The `fixpair` binary builds a "buggy function → fixed function" dataset
//! from a table of recorded single-line changes.
//!
//! ## Usage
//!
//! ```bash
//! fixpair --config ./config/fixpair.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fixpair build` | Fetch, locate and write every unfinished batch |
//! | `fixpair status` | Show which batch files already exist |
//! | `fixpair locate <file> <line>` | Print the function enclosing a line of a local file |
//!
//! ## Examples
//!
//! ```bash
//! # Build (resumes at the first missing batch file)
//! fixpair build --config ./config/fixpair.toml
//!
//! # Smaller batches into a scratch directory, JSON progress on stderr
//! fixpair build --batch-size 20 --output /tmp/pairs --progress json
//!
//! # Check the locator on a local file
//! fixpair locate src/app.py 42
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fixpair::progress::ProgressMode;
use fixpair::{build, config, locate, status};

/// fixpair — build buggy/fixed function pairs from recorded one-line changes.
#[derive(Parser)]
#[command(
    name = "fixpair",
    about = "Build buggy-function to fixed-function training pairs from recorded one-line changes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/fixpair.toml`. Input, output, and remote store
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/fixpair.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build every batch whose output file does not exist yet.
    ///
    /// For each row: fetch the before and after file contents, find the
    /// function enclosing the changed line in both, and emit one sample.
    /// Batches are written as `batch_NNN.jsonl` in the output directory.
    Build {
        /// Override `output.batch_size` from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override `output.dir` from config.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Progress on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal, otherwise `off`.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List planned batches and whether each is complete.
    Status {
        /// Override `output.batch_size` from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override `output.dir` from config.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the innermost function enclosing a line of a local Python file.
    Locate {
        /// Python source file.
        file: PathBuf,
        /// 1-based line number.
        line: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Locate { file, line } = &cli.command {
        let source = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        match locate::locate(&source, *line) {
            Some(text) => println!("{}", text),
            None => bail!("no enclosing function at {}:{}", file.display(), line),
        }
        return Ok(());
    }

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build {
            batch_size,
            output,
            progress,
        } => {
            apply_overrides(&mut cfg, batch_size, output)?;
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(s) => ProgressMode::parse(s).ok_or_else(|| {
                    anyhow::anyhow!("Unknown progress mode '{}'. Use off, human, or json.", s)
                })?,
            };
            let reporter = mode.reporter();
            build::run_build(&cfg, reporter.as_ref()).await?;
        }
        Commands::Status { batch_size, output } => {
            apply_overrides(&mut cfg, batch_size, output)?;
            status::print_status(&cfg)?;
        }
        Commands::Locate { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

fn apply_overrides(
    cfg: &mut config::Config,
    batch_size: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(size) = batch_size {
        cfg.output.batch_size = size;
    }
    if let Some(dir) = output {
        cfg.output.dir = dir;
    }
    config::validate(cfg)
}
