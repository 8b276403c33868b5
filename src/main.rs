//! resource-store CLI - Inspect and edit a resource store from the terminal

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "resource-store")]
#[command(version)]
#[command(about = "Hierarchical resource store persisted in SQLite")]
#[command(long_about = r#"
resource-store keeps a tree of directories and resources in a single SQLite
table and exposes it like a small filesystem.

Example usage:
  resource-store init
  resource-store put styles/point.sld --from ./point.sld
  resource-store ls styles
  resource-store mv styles/point.sld styles/archive/point.sld
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (overrides the lookup in the data directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding the configuration, database and cache
    #[arg(short, long, global = true, env = "RESOURCE_STORE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and initialize the database
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// List the children of a directory
    Ls {
        /// Directory to list (defaults to the base)
        #[arg(default_value = "")]
        path: String,

        /// Only show names matching this glob
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Print the content of a resource
    Cat {
        path: String,
    },

    /// Store content in a resource, creating it if needed
    Put {
        path: String,

        /// Read the content from a file instead of stdin
        #[arg(short, long)]
        from: Option<PathBuf>,
    },

    /// Create a directory and any missing parents
    Mkdir {
        path: String,
    },

    /// Remove a resource or a directory with everything below it
    Rm {
        path: String,
    },

    /// Move or rename a resource or directory
    Mv {
        from: String,
        to: String,
    },

    /// Materialize a resource in the local cache and print its path
    Cache {
        path: String,
    },

    /// Copy a local directory tree into the store
    Import {
        dir: PathBuf,

        /// Additional gitignore-style patterns to skip
        #[arg(short, long)]
        exclude: Vec<String>,
    },

    /// Show statistics about the store
    Stats,

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        *self == OutputMode::Human
    }
}

/// Print a JSON success envelope for `command`.
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    debug_assert!(!output_mode.is_human());
    let envelope = serde_json::json!({
        "ok": true,
        "command": command,
        "data": data,
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let data_dir = cli.data_dir.unwrap_or_else(resource_store::config::default_data_dir);
    let ctx = commands::Context {
        output_mode,
        data_dir,
        config: cli.config,
    };

    match cli.command {
        Commands::Init { force } => commands::run_init(&ctx, force),
        Commands::Ls { path, filter } => commands::run_ls(&ctx, &path, filter.as_deref()),
        Commands::Cat { path } => commands::run_cat(&ctx, &path),
        Commands::Put { path, from } => commands::run_put(&ctx, &path, from.as_deref()),
        Commands::Mkdir { path } => commands::run_mkdir(&ctx, &path),
        Commands::Rm { path } => commands::run_rm(&ctx, &path),
        Commands::Mv { from, to } => commands::run_mv(&ctx, &from, &to),
        Commands::Cache { path } => commands::run_cache(&ctx, &path),
        Commands::Import { dir, exclude } => commands::run_import(&ctx, &dir, &exclude),
        Commands::Stats => commands::run_stats(&ctx),
        Commands::Version => commands::run_version(output_mode),
    }
}
