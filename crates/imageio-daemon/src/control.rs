//! Control plane ticket operations
//!
//! The orchestration system installs a ticket before a transfer starts,
//! extends it while the transfer is running and deletes it when done.

use std::sync::Arc;

use imageio_ticket::{TicketAuthority, TicketInfo, TicketResult};
use serde_json::Value;
use tracing::debug;

/// Ticket administration
#[derive(Debug, Clone)]
pub struct ControlService {
    authority: Arc<TicketAuthority>,
}

impl ControlService {
    /// Create a service managing `authority`
    pub fn new(authority: Arc<TicketAuthority>) -> Self {
        Self { authority }
    }

    /// Install the ticket described by `value` under `id`.
    ///
    /// The ticket is fully validated first; an invalid ticket leaves the
    /// registry untouched.
    pub fn put_ticket(&self, id: &str, value: &Value) -> TicketResult<TicketInfo> {
        let ticket = self.authority.parse(value)?;
        let info = ticket.info();
        self.authority.add(id, ticket);
        Ok(info)
    }

    /// Current state of the ticket under `id`
    pub fn get_ticket(&self, id: &str) -> TicketResult<TicketInfo> {
        debug!(ticket_id = %id, "Retrieving ticket");
        Ok(self.authority.get(id)?.info())
    }

    /// Expire the ticket under `id` in `timeout` seconds from now.
    ///
    /// Returns the new deadline.
    pub fn extend_ticket(&self, id: &str, timeout: u64) -> TicketResult<u64> {
        self.authority.extend(id, timeout)
    }

    /// Remove the ticket under `id`
    pub fn delete_ticket(&self, id: &str) -> TicketResult<()> {
        self.authority.remove(id).map(|_| ())
    }
}
