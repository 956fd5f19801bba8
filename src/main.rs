mod commands;

use clap::{Parser, Subcommand};
use pourover::InstallOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pour")]
#[command(author, version, about = "Install formulae from bottles or source", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install formulae and their dependencies
    Install {
        /// Formula names
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Directory holding <name>.json formula descriptors
        #[arg(long, env = "POUR_FORMULA_DIR", default_value = "Formula")]
        formula_dir: PathBuf,

        /// Build from source even if a bottle is available
        #[arg(long, short = 's')]
        build_from_source: bool,

        /// Pour a bottle even if --build-from-source is given
        #[arg(long)]
        force_bottle: bool,

        /// Fail on any verification anomaly instead of warning
        #[arg(long)]
        strict: bool,

        /// Show what would be installed without doing it
        #[arg(long, short = 'n')]
        dry_run: bool,

        /// Keep temporary extraction and build directories
        #[arg(long)]
        keep_tmp: bool,

        /// Build with debug symbols
        #[arg(long, short = 'd')]
        debug_symbols: bool,

        /// Compiler for source builds (e.g. gcc, clang)
        #[arg(long)]
        cc: Option<String>,

        /// Bottle platform tag to use instead of the detected one
        #[arg(long)]
        platform: Option<String>,

        /// Upper bound on retries of retryable failures
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },

    /// Check an installed formula
    Verify {
        /// Formula name
        formula: String,

        /// Directory holding formula descriptors, for declared artifacts
        #[arg(long, env = "POUR_FORMULA_DIR")]
        formula_dir: Option<PathBuf>,
    },

    /// Show the build system and commands detected for a source directory
    Detect {
        /// Source directory
        dir: PathBuf,

        /// Install prefix to plan for
        #[arg(long)]
        prefix: Option<PathBuf>,
    },

    /// Print the bottle platform tag of this machine
    Platform,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "warn,pourover=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Install {
            formulae,
            formula_dir,
            build_from_source,
            force_bottle,
            strict,
            dry_run,
            keep_tmp,
            debug_symbols,
            cc,
            platform,
            retries,
        } => {
            let options = InstallOptions {
                build_from_source,
                force_bottle,
                strict_verification: strict,
                dry_run,
                keep_tmp,
                debug_symbols,
                verbose: cli.verbose,
                compiler: cc,
            };
            commands::install(commands::InstallArgs {
                formulae,
                formula_dir,
                options,
                platform,
                retries,
            })
            .await?;
        }
        Commands::Verify {
            formula,
            formula_dir,
        } => {
            commands::verify(&formula, formula_dir.as_deref())?;
        }
        Commands::Detect { dir, prefix } => {
            commands::detect(&dir, prefix)?;
        }
        Commands::Platform => {
            commands::platform();
        }
    }

    Ok(())
}
