use std::path::PathBuf;

use thiserror::Error;

use crate::graph::GraphError;
use crate::ingest::ExtractError;
use crate::load::LoadError;
use crate::store::{EmitError, StoreConfigError, StoreError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported format: {name} (available: {available})")]
    UnsupportedFormat { name: String, available: String },

    #[error("Output already exists: {}", .0.display())]
    OutputAlreadyExists(PathBuf),

    #[error("Failed to extract {}: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid store configuration: {0}")]
    Config(#[from] StoreConfigError),

    #[error("Emit error: {0}")]
    Emit(#[from] EmitError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
