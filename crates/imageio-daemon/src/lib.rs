//! Image transfer daemon services
//!
//! Wires the ticket authority, configuration and logging together:
//! - [`ControlService`]: ticket installation and lifetime for the control plane
//! - [`TransferService`]: per-request authorization and extent reports
//! - [`Daemon`]: owns the authority from start to shutdown
//!
//! HTTP routing and the image I/O itself live outside this crate; handlers
//! call into these services before moving any byte.

#![warn(missing_docs)]

pub mod control;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod transfer;

pub use control::ControlService;
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use logging::init_logging;
pub use transfer::TransferService;
