use argos_magic::entries::DEFAULT_MAX_INDIRECTIONS;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Files are probed on their first bytes only.
pub const DEFAULT_READ_LIMIT: usize = 1024 * 1024;

#[derive(Parser)]
#[command(name = "argos-magic")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Identify file contents by signature rules", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify one or more files
    Identify {
        /// Ruleset file; the built-in rules are used when omitted
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        #[arg(long, default_value_t = DEFAULT_READ_LIMIT)]
        read_limit: usize,

        #[arg(long, default_value_t = DEFAULT_MAX_INDIRECTIONS)]
        max_indirections: usize,

        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the rule tree with strengths
    Dump {
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },

    /// Write the built-in rules to a ruleset file
    Export { output: PathBuf },
}
