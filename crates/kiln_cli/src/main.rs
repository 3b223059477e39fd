//! Kiln CLI — sample build clients for the Kiln incremental build engine.
//!
//! Provides `kiln gzip` for compressing a directory tree, `kiln lint` for
//! linting source files with cached per-file results, and `kiln clean` for
//! removing a build's outputs and cache.

#![warn(missing_docs)]

mod config;
mod gzip;
mod lint;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use kiln_engine::{BuildError, Engine};

/// Kiln — an incremental build cache engine.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln build cache demos")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The file used to store cached results.
    #[arg(long, global = true, default_value = ".kiln.cache")]
    pub cache: PathBuf,

    /// Path to a `kiln.toml` with per-function versions.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress every file under a directory with gzip.
    Gzip {
        /// The input directory.
        input_dir: PathBuf,

        /// The output directory; mirrors the input's structure with `.gz`
        /// appended to each file name.
        output_dir: PathBuf,
    },
    /// Lint the source files under a directory.
    Lint {
        /// The directory to lint.
        dir: PathBuf,

        /// File extension to lint.
        #[arg(long, default_value = "rs")]
        ext: String,
    },
    /// Remove the previous build's outputs and clear the cache.
    Clean {
        /// Expected build name; refuses a cache created for another build.
        #[arg(long)]
        name: Option<String>,
    },
}

/// Errors surfaced by the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A build failed or was rolled back.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The configuration file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let versions = match &cli.config {
        Some(path) => config::load_config(path)?.versions,
        None => Default::default(),
    };
    let engine = Engine::new(&cli.cache);

    match &cli.command {
        Command::Gzip {
            input_dir,
            output_dir,
        } => {
            let count = gzip::gzip_dir(&engine, input_dir, output_dir, versions)?;
            println!("compressed {count} files");
            Ok(())
        }
        Command::Lint { dir, ext } => {
            let output = lint::lint_dir(&engine, dir, ext, versions)?;
            print!("{output}");
            Ok(())
        }
        Command::Clean { name } => {
            engine.clean(name.as_deref())?;
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
