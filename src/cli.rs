// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// codevec - Embedding indexer and code search
///
/// Indexes files, functions and classes as embeddings and searches them
/// semantically, by keyword, or by similarity to a stored unit.
#[derive(Parser, Debug)]
#[command(name = "codevec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Database path (defaults to the nearest .codevec/embeddings.sqlite)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory, extract units and embed them
    Index {
        /// Directory to index (defaults to current directory)
        path: Option<PathBuf>,

        /// Repository id (defaults to the directory name)
        #[arg(short, long)]
        repository: Option<String>,

        /// Units per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Path patterns to exclude (repeatable)
        #[arg(short = 'e', long = "exclude")]
        exclude_paths: Vec<String>,

        /// Delete the repository's existing units first
        #[arg(long)]
        replace: bool,
    },

    /// Index a pre-decomposed `{repositoryId, units}` JSON request
    Ingest {
        /// Request file, or `-` for stdin
        file: PathBuf,

        /// Delete the repository's existing units first
        #[arg(long)]
        replace: bool,
    },

    /// Search indexed units
    Search {
        /// Query text
        query: String,

        /// Search type: semantic, exact or similarity
        #[arg(short = 't', long = "type", default_value = "semantic")]
        search_type: String,

        /// Restrict to a language
        #[arg(short, long)]
        language: Option<String>,

        /// Restrict to a unit type (file, function, class)
        #[arg(long = "unit-type")]
        unit_type: Option<String>,

        /// Complexity band (low, medium, high)
        #[arg(long)]
        complexity: Option<String>,

        /// Restrict to a repository id
        #[arg(short, long)]
        repository: Option<String>,

        /// Maximum number of results
        #[arg(short = 'm', long)]
        limit: Option<usize>,

        /// Minimum score in [0, 1]
        #[arg(long)]
        threshold: Option<f32>,

        /// Deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Find units similar to a stored reference unit
    Similar {
        /// Repository id of the reference
        #[arg(short, long)]
        repository: String,

        /// Reference file path
        #[arg(short, long)]
        file: Option<String>,

        /// Reference function name
        #[arg(long)]
        function: Option<String>,

        /// Reference class name
        #[arg(long)]
        class: Option<String>,

        #[arg(short = 'm', long)]
        limit: Option<usize>,

        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Nearest neighbors of a raw embedding
    Vector {
        /// JSON array of numbers
        embedding: String,

        #[arg(short = 'm', long)]
        limit: Option<usize>,

        #[arg(long)]
        threshold: Option<f32>,

        /// JSON filter document, e.g. '{"language": "rust"}'
        #[arg(long)]
        filter: Option<String>,
    },

    /// Per-type statistics of a repository
    Stats {
        /// Repository id (defaults to the indexed directory name)
        repository: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
