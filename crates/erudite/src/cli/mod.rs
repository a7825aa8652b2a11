pub mod extract;
pub mod load;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "erudite",
    about = "Extract Project Gutenberg books and load them into a vector store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert HTML books to JSON documents
    Extract {
        /// An .html file or a directory of them
        #[arg(short = 'i', long)]
        input: PathBuf,
        /// Output directory or file (next to the input if omitted)
        #[arg(short = 'o', long, visible_alias = "output-dir")]
        output: Option<PathBuf>,
        /// Extractor format (e.g. gutenberg)
        #[arg(short = 'f', long)]
        format: String,
        /// Replace existing output files
        #[arg(long)]
        overwrite: bool,
        /// Files extracted in parallel (defaults to the number of CPUs)
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
    },
    /// Load extracted JSON documents into the store
    Load {
        /// A .json file or a directory of them
        #[arg(short = 'i', long)]
        input: PathBuf,
        /// Store address, e.g. http://localhost:8080
        #[arg(short = 't', long)]
        target: String,
        /// Store schema to load into
        #[arg(short = 's', long, default_value = "gutenberg")]
        schema: String,
        /// Loader format (e.g. gutenberg)
        #[arg(short = 'f', long)]
        format: String,
        /// Store API key (falls back to ERUDITE_API_KEY)
        #[arg(long)]
        key: Option<String>,
    },
}
