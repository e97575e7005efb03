//! Daemon error types

use imageio_block::BlockError;
use imageio_config::ConfigError;
use imageio_ticket::TicketError;
use thiserror::Error;

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ticket construction, lookup or authorization failed
    #[error(transparent)]
    Ticket(#[from] TicketError),

    /// Extent query failed
    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),
}

impl DaemonError {
    /// HTTP status reported to the client
    pub fn status_code(&self) -> u16 {
        match self {
            DaemonError::Ticket(e) => e.status_code(),
            DaemonError::Block(BlockError::InvalidOffset { .. })
            | DaemonError::Block(BlockError::InvalidLength { .. }) => 416,
            DaemonError::Block(BlockError::Unsupported(_))
            | DaemonError::Block(BlockError::MissingContext(_)) => 404,
            DaemonError::Block(_) | DaemonError::Config(_) | DaemonError::Logging(_) => 500,
        }
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
