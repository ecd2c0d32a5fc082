//! Error type shared by the tree, the descriptor types and the ingestion adapter

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tree configuration: {0}")]
    InvalidConfig(String),

    /// A descriptor row does not have the byte width the descriptor type expects
    #[error("descriptor size mismatch: expected {expected} bytes, got {actual}")]
    DescriptorSize { expected: usize, actual: usize },

    #[error("descriptor word count mismatch: expected {expected} words, got {actual}")]
    WordCount { expected: usize, actual: usize },

    #[error("descriptor has bits set beyond its width of {0} bits")]
    PaddingBits(usize),

    /// `expected` is `usize::MAX` when `rows * row_bytes` overflows
    #[error("descriptor matrix shape mismatch: {rows} rows of {row_bytes} bytes need {expected} bytes, got {actual}")]
    MatrixShape {
        rows: usize,
        row_bytes: usize,
        expected: usize,
        actual: usize,
    },

    #[error("reference count mismatch: expected one reference per row ({expected}), got {actual}")]
    ReferenceCount { expected: usize, actual: usize },

    #[error("invalid bit string: {0}")]
    InvalidBitString(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
