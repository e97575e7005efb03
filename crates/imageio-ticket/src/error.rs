//! Error types for ticket operations

use std::fmt;

use thiserror::Error;

use crate::ticket::Op;

/// Reason an authorization was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No ticket registered under the id
    NoSuchTicket,
    /// Ticket deadline has passed
    Expired,
    /// Ticket does not grant the operation
    OperationNotPermitted(Op),
    /// Request reaches past the ticket size
    SizeExceeded {
        /// Requested size
        requested: u64,
        /// Ticket size
        allowed: u64,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NoSuchTicket => write!(f, "no such ticket"),
            DenyReason::Expired => write!(f, "expired"),
            DenyReason::OperationNotPermitted(op) => {
                write!(f, "operation not permitted: {op}")
            }
            DenyReason::SizeExceeded { requested, allowed } => write!(
                f,
                "size exceeds authorized range: {requested} > {allowed}"
            ),
        }
    }
}

/// Ticket error types
#[derive(Debug, Error)]
pub enum TicketError {
    /// Required ticket field is absent
    #[error("missing ticket parameter: {field}")]
    MissingParameter {
        /// Field name
        field: String,
    },

    /// Ticket field is present but unusable
    #[error("invalid ticket parameter {field}={value}: {reason}")]
    InvalidParameter {
        /// Field name
        field: String,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// Unknown ticket id
    #[error("no such ticket: {0}")]
    NotFound(String),

    /// Authorization denied
    #[error("forbidden: ticket {ticket_id}: {reason}")]
    Forbidden {
        /// Ticket id from the request
        ticket_id: String,
        /// Why access was denied
        reason: DenyReason,
    },
}

impl TicketError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingParameter {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn forbidden(ticket_id: &str, reason: DenyReason) -> Self {
        Self::Forbidden {
            ticket_id: ticket_id.to_string(),
            reason,
        }
    }

    /// HTTP status reported to the client
    pub fn status_code(&self) -> u16 {
        match self {
            TicketError::MissingParameter { .. } | TicketError::InvalidParameter { .. } => 400,
            TicketError::Forbidden { .. } => 403,
            TicketError::NotFound(_) => 404,
        }
    }

    /// Denial reason, if this is an authorization failure
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            TicketError::Forbidden { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Result type for ticket operations
pub type TicketResult<T> = Result<T, TicketError>;
