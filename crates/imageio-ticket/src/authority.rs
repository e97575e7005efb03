//! Ticket authority
//!
//! Registry of live tickets, consulted before any image byte moves. Every
//! operation takes the registry lock exactly once, so a concurrent reader
//! sees a ticket either before or after a mutation and never in between.
//! Expiry is checked lazily by [`TicketAuthority::authorize`]; expired
//! tickets stay registered until removed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::error::{DenyReason, TicketError, TicketResult};
use crate::ticket::{Op, Ticket};

/// Registry of transfer tickets
#[derive(Debug)]
pub struct TicketAuthority {
    tickets: RwLock<HashMap<String, Ticket>>,
    clock: Arc<dyn Clock>,
}

impl TicketAuthority {
    /// Create an empty authority on the monotonic clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock))
    }

    /// Create an empty authority reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tickets: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Clock used for deadlines
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Build a ticket from its control plane representation using this
    /// authority's clock
    pub fn parse(&self, value: &serde_json::Value) -> TicketResult<Ticket> {
        Ticket::from_json(value, self.clock.as_ref())
    }

    /// Register `ticket` under `id`, replacing any previous ticket
    pub fn add(&self, id: &str, ticket: Ticket) {
        info!(ticket_id = %id, ticket = %ticket, "Adding ticket");
        self.tickets.write().insert(id.to_string(), ticket);
    }

    /// Unregister the ticket under `id`
    pub fn remove(&self, id: &str) -> TicketResult<Ticket> {
        match self.tickets.write().remove(id) {
            Some(ticket) => {
                info!(ticket_id = %id, "Removed ticket");
                Ok(ticket)
            }
            None => Err(TicketError::NotFound(id.to_string())),
        }
    }

    /// Unregister all tickets
    pub fn clear(&self) {
        let mut tickets = self.tickets.write();
        info!(count = tickets.len(), "Clearing tickets");
        tickets.clear();
    }

    /// Snapshot of the ticket under `id`
    pub fn get(&self, id: &str) -> TicketResult<Ticket> {
        self.tickets
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TicketError::NotFound(id.to_string()))
    }

    /// Reset the deadline of the ticket under `id` to `now + timeout`.
    ///
    /// The new deadline never depends on the previous one, so an expired
    /// ticket can be revived. Returns the new deadline.
    pub fn extend(&self, id: &str, timeout: u64) -> TicketResult<u64> {
        let mut tickets = self.tickets.write();
        let ticket = tickets
            .get_mut(id)
            .ok_or_else(|| TicketError::NotFound(id.to_string()))?;
        let expires = self.clock.now_secs().saturating_add(timeout);
        info!(
            ticket_id = %id,
            old_expires = ticket.expires(),
            expires,
            "Extending ticket"
        );
        ticket.set_expires(expires);
        Ok(expires)
    }

    /// Check that the ticket under `id` grants `op` on the first `size`
    /// bytes of the image.
    ///
    /// Checks run in a fixed order and the first failure is reported:
    /// unknown id, expired, operation not granted, size too large.
    pub fn authorize(&self, id: &str, op: Op, size: u64) -> TicketResult<Ticket> {
        debug!(ticket_id = %id, %op, size, "Authorizing request");

        let result = {
            let tickets = self.tickets.read();
            check(tickets.get(id), self.clock.now_secs(), op, size)
        };

        result.map_err(|reason| {
            warn!(ticket_id = %id, %op, size, %reason, "Request denied");
            TicketError::forbidden(id, reason)
        })
    }

    /// Number of registered tickets
    pub fn len(&self) -> usize {
        self.tickets.read().len()
    }

    /// Check if no tickets are registered
    pub fn is_empty(&self) -> bool {
        self.tickets.read().is_empty()
    }
}

impl Default for TicketAuthority {
    fn default() -> Self {
        Self::new()
    }
}

fn check(ticket: Option<&Ticket>, now: u64, op: Op, size: u64) -> Result<Ticket, DenyReason> {
    let ticket = ticket.ok_or(DenyReason::NoSuchTicket)?;
    if ticket.is_expired(now) {
        return Err(DenyReason::Expired);
    }
    if !ticket.allows(op) {
        return Err(DenyReason::OperationNotPermitted(op));
    }
    if size > ticket.size() {
        return Err(DenyReason::SizeExceeded {
            requested: size,
            allowed: ticket.size(),
        });
    }
    Ok(ticket.clone())
}
