//! Error types for stepseq

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SequencerError {
    pub(crate) fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;
