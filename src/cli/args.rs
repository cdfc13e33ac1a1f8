//! CLI argument parsing using clap.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Symbol index and point queries for Java source trees
#[derive(Parser, Debug)]
#[command(
    name = "refindex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Symbol index and point queries for Java source trees",
    long_about = "Index project definitions and references, then answer hover, definition and reference queries as JSON.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace root (defaults to the nearest directory holding .refindex)
    #[arg(short, long, global = true, env = "REFINDEX_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// A cursor inside a source file. Lines and characters are zero-based.
#[derive(Args, Debug, Clone)]
pub struct PositionArgs {
    /// Source file, relative to the current directory
    pub file: PathBuf,

    /// Zero-based line
    pub line: u32,

    /// Zero-based character column
    pub character: u32,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a project configuration
    #[command(
        about = "Write a project configuration (and default settings if missing)",
        after_help = "Examples:\n  refindex init app --source-root src/main/java\n  refindex init lib --dir lib --source-root lib/src --force"
    )]
    Init {
        /// Unit name of the project
        unit: String,

        /// Source root, relative to the workspace root (repeatable)
        #[arg(short, long = "source-root", value_name = "DIR")]
        source_roots: Vec<PathBuf>,

        /// Directory the configuration is written to
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Build the index of every project under the workspace root
    #[command(about = "Build the index of every project in the workspace")]
    Index {
        /// Rebuild indexes that already exist
        #[arg(short, long)]
        force: bool,
    },

    /// Declaration of the symbol at a position
    Definition(PositionArgs),

    /// Hover title and documentation of the symbol at a position
    Hover(PositionArgs),

    /// Declaration and references of the symbol at a position
    Refs(PositionArgs),

    /// Exported declarations of the workspace
    Exported,

    /// Symbols the workspace uses from external dependencies
    ExternalRefs,

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,
}
