//! Block layer error types
//!
//! Errors raised while querying backends and normalizing extents.

use std::io;

use thiserror::Error;

/// Block layer result type
pub type BlockResult<T> = Result<T, BlockError>;

/// Block layer error types
#[derive(Debug, Error)]
pub enum BlockError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (malformed or inconsistent backend reply)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Range outside the export
    #[error("Invalid range: offset {offset} length {length} (export size: {size})")]
    InvalidOffset {
        /// Requested offset
        offset: u64,
        /// Requested length
        length: u64,
        /// Export size
        size: u64,
    },

    /// Query length outside `1..=MAX_LENGTH`
    #[error("Invalid length: {length}")]
    InvalidLength {
        /// Requested length
        length: u64,
    },

    /// Meta context was not negotiated with the server
    #[error("Meta context not available: {0}")]
    MissingContext(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}
