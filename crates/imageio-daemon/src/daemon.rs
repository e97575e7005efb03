//! Daemon service object
//!
//! Owns the ticket authority for the lifetime of the process and hands out
//! the control and transfer services that share it.

use std::sync::Arc;

use imageio_config::{validate, DaemonConfig, ValidationWarning};
use imageio_ticket::{Clock, MonotonicClock, TicketAuthority};
use tracing::{info, warn};

use crate::control::ControlService;
use crate::error::DaemonResult;
use crate::logging::init_logging;
use crate::transfer::TransferService;

/// Image transfer daemon
#[derive(Debug)]
pub struct Daemon {
    config: DaemonConfig,
    authority: Arc<TicketAuthority>,
    warnings: Vec<ValidationWarning>,
}

impl Daemon {
    /// Create a daemon on the monotonic clock.
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Create a daemon reading ticket deadlines from `clock`
    pub fn with_clock(config: DaemonConfig, clock: Arc<dyn Clock>) -> DaemonResult<Self> {
        let warnings = validate(&config).into_result()?;
        Ok(Self {
            config,
            authority: Arc::new(TicketAuthority::with_clock(clock)),
            warnings,
        })
    }

    /// Install logging and report configuration warnings
    pub fn start(&self) -> DaemonResult<()> {
        init_logging(&self.config.log)?;
        for warning in &self.warnings {
            warn!(%warning, "Configuration warning");
        }
        info!(
            max_query_length = self.config.extents.max_query_length,
            "Daemon started"
        );
        Ok(())
    }

    /// Drop all tickets
    pub fn shutdown(&self) {
        info!(tickets = self.authority.len(), "Daemon shutting down");
        self.authority.clear();
    }

    /// Active configuration
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Non-fatal configuration issues found at construction
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Shared ticket authority
    pub fn authority(&self) -> &Arc<TicketAuthority> {
        &self.authority
    }

    /// Control plane ticket operations
    pub fn control(&self) -> ControlService {
        ControlService::new(self.authority.clone())
    }

    /// Transfer request authorization and extent queries
    pub fn transfer(&self) -> TransferService {
        TransferService::new(
            self.authority.clone(),
            self.config.extents.max_query_length,
        )
    }
}
