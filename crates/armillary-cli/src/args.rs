//! Command-line argument definitions for the Armillary CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Arguments select the document, the edits to replay on it,
//! the query to print, the output path, configuration file selection and
//! logging verbosity.

use clap::Parser;

/// Command-line arguments for the Armillary model tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input JSON document
    #[arg(help = "Path to the input document")]
    pub input: String,

    /// Selector whose matches are printed as `id type name`
    #[arg(short, long)]
    pub select: Option<String>,

    /// JSON file holding an array of operations to apply in order
    #[arg(short, long)]
    pub apply: Option<String>,

    /// Number of operations to undo after applying
    #[arg(short, long, default_value_t = 0)]
    pub undo: usize,

    /// Path to write the resulting document to
    #[arg(short, long)]
    pub output: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
