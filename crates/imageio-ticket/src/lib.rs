//! Ticket authority for image transfers
//!
//! A ticket is a short lived grant to read or write the bytes of one image.
//! The control plane installs tickets; every transfer request is checked
//! against them before any byte is moved:
//! - Ticket construction and validation from the control plane JSON
//! - Injected monotonic clock for deadlines
//! - Concurrency safe registry with ordered authorization checks

#![warn(missing_docs)]

pub mod authority;
pub mod clock;
pub mod error;
pub mod ticket;

pub use authority::TicketAuthority;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{DenyReason, TicketError, TicketResult};
pub use ticket::{Op, Ticket, TicketInfo, SUPPORTED_SCHEMES};
