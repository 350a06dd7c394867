use thiserror::Error;

use crate::types::BatchContext;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Oracle failed for batch {ctx}: {source}")]
    Oracle {
        ctx: BatchContext,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = DedupError> = std::result::Result<T, E>;
