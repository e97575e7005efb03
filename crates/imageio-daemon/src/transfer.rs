//! Transfer side authorization and extent queries
//!
//! Every request is authorized against its ticket before the backend is
//! touched. A request for `[offset, offset + length)` needs a ticket whose
//! size covers `offset + length`.

use std::sync::Arc;

use imageio_block::{
    DirtyExtent, DirtyFlags, Extent, ExtentBackend, ExtentFlags, ExtentWalker, ZeroExtent,
    ZeroFlags,
};
use imageio_ticket::{Op, Ticket, TicketAuthority, TicketResult};
use tracing::debug;

use crate::error::DaemonResult;

/// Request authorization and extent reporting
#[derive(Debug, Clone)]
pub struct TransferService {
    authority: Arc<TicketAuthority>,
    max_query_length: u64,
}

impl TransferService {
    /// Create a service checking requests against `authority`, querying
    /// backends at most `max_query_length` bytes at a time
    pub fn new(authority: Arc<TicketAuthority>, max_query_length: u64) -> Self {
        Self {
            authority,
            max_query_length,
        }
    }

    /// Authorize reading `length` bytes at `offset`
    pub fn authorize_read(&self, ticket_id: &str, offset: u64, length: u64) -> TicketResult<Ticket> {
        self.authority
            .authorize(ticket_id, Op::Read, offset.saturating_add(length))
    }

    /// Authorize writing `length` bytes at `offset`
    pub fn authorize_write(
        &self,
        ticket_id: &str,
        offset: u64,
        length: u64,
    ) -> TicketResult<Ticket> {
        self.authority
            .authorize(ticket_id, Op::Write, offset.saturating_add(length))
    }

    /// Report data and zero extents of `[offset, offset + length)`, or up to
    /// the end of the image when `length` is `None`
    pub async fn zero_extents<B>(
        &self,
        ticket_id: &str,
        backend: &mut B,
        offset: u64,
        length: Option<u64>,
    ) -> DaemonResult<Vec<ZeroExtent>>
    where
        B: ExtentBackend<ZeroFlags> + ?Sized,
    {
        self.extents(ticket_id, backend, offset, length).await
    }

    /// Report clean and dirty extents of `[offset, offset + length)`, or up
    /// to the end of the image when `length` is `None`
    pub async fn dirty_extents<B>(
        &self,
        ticket_id: &str,
        backend: &mut B,
        offset: u64,
        length: Option<u64>,
    ) -> DaemonResult<Vec<DirtyExtent>>
    where
        B: ExtentBackend<DirtyFlags> + ?Sized,
    {
        self.extents(ticket_id, backend, offset, length).await
    }

    async fn extents<F, B>(
        &self,
        ticket_id: &str,
        backend: &mut B,
        offset: u64,
        length: Option<u64>,
    ) -> DaemonResult<Vec<Extent<F>>>
    where
        F: ExtentFlags,
        B: ExtentBackend<F> + ?Sized,
    {
        let end = match length {
            Some(length) => offset.saturating_add(length),
            None => backend.export_size().max(offset),
        };
        self.authority.authorize(ticket_id, Op::Read, end)?;

        debug!(ticket_id = %ticket_id, offset, ?length, "Querying extents");
        let extents = ExtentWalker::new(backend, offset, length)?
            .with_max_length(self.max_query_length)
            .collect()
            .await?;
        Ok(extents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageio_block::{check_query, BlockError, BlockResult, StatusExtent};
    use imageio_ticket::{DenyReason, ManualClock, TicketError};
    use serde_json::json;

    use crate::error::DaemonError;

    const SIZE: u64 = 1 << 20;

    /// Allocated first half, zero second half, counting queries
    struct HalfZero {
        queries: Vec<(u64, u64)>,
    }

    #[async_trait::async_trait]
    impl ExtentBackend<ZeroFlags> for HalfZero {
        fn export_size(&self) -> u64 {
            SIZE
        }

        async fn query_extents(
            &mut self,
            offset: u64,
            length: u64,
        ) -> BlockResult<Vec<StatusExtent<ZeroFlags>>> {
            check_query(offset, length, SIZE)?;
            self.queries.push((offset, length));
            let half = SIZE / 2;
            let zero = offset >= half;
            let length = if zero { length } else { length.min(half - offset) };
            Ok(vec![StatusExtent::new(
                length,
                ZeroFlags::new(zero, Some(false)),
            )])
        }
    }

    fn service(size: u64, ops: &[&str]) -> (Arc<ManualClock>, TransferService) {
        let clock = Arc::new(ManualClock::new(0));
        let authority = Arc::new(TicketAuthority::with_clock(clock.clone()));
        let ticket = authority
            .parse(&json!({
                "uuid": "t1",
                "size": size,
                "ops": ops,
                "timeout": 60,
                "url": "file:///var/tmp/disk.raw",
            }))
            .unwrap();
        authority.add("t1", ticket);
        (clock, TransferService::new(authority, 64 * 1024))
    }

    fn denial(err: DaemonError) -> DenyReason {
        match err {
            DaemonError::Ticket(TicketError::Forbidden { reason, .. }) => reason,
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn test_authorize_range() {
        let (_, transfer) = service(SIZE, &["read"]);
        assert!(transfer.authorize_read("t1", 0, SIZE).is_ok());
        assert!(transfer.authorize_read("t1", SIZE - 512, 512).is_ok());

        match transfer.authorize_read("t1", SIZE - 512, 1024) {
            Err(TicketError::Forbidden { reason, .. }) => assert_eq!(
                reason,
                DenyReason::SizeExceeded {
                    requested: SIZE + 512,
                    allowed: SIZE
                }
            ),
            other => panic!("unexpected result {other:?}"),
        }

        assert!(matches!(
            transfer.authorize_write("t1", 0, 512),
            Err(TicketError::Forbidden {
                reason: DenyReason::OperationNotPermitted(Op::Write),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_zero_extents() {
        let (_, transfer) = service(SIZE, &["read"]);
        let mut backend = HalfZero { queries: vec![] };

        let extents = transfer
            .zero_extents("t1", &mut backend, 0, None)
            .await
            .unwrap();
        assert_eq!(
            extents,
            vec![
                ZeroExtent::new(0, SIZE / 2, false, Some(false)),
                ZeroExtent::new(SIZE / 2, SIZE / 2, true, Some(false)),
            ]
        );

        // Queries are capped at the configured length.
        assert_eq!(backend.queries.len(), 16);
        assert!(backend.queries.iter().all(|&(_, len)| len <= 64 * 1024));
    }

    #[tokio::test]
    async fn test_extents_denied_before_backend_query() {
        let (clock, transfer) = service(SIZE / 2, &["read"]);
        let mut backend = HalfZero { queries: vec![] };

        let err = transfer
            .zero_extents("t1", &mut backend, 0, None)
            .await
            .unwrap_err();
        assert_eq!(
            denial(err),
            DenyReason::SizeExceeded {
                requested: SIZE,
                allowed: SIZE / 2
            }
        );

        assert!(transfer
            .zero_extents("t1", &mut backend, 0, Some(SIZE / 2))
            .await
            .is_ok());

        clock.advance(60);
        let err = transfer
            .zero_extents("t1", &mut backend, 0, Some(4096))
            .await
            .unwrap_err();
        assert_eq!(denial(err), DenyReason::Expired);

        let err = transfer
            .zero_extents("missing", &mut backend, 0, Some(4096))
            .await
            .unwrap_err();
        assert_eq!(denial(err), DenyReason::NoSuchTicket);

        // Only the one authorized walk reached the backend.
        assert_eq!(backend.queries.len(), 8);
    }

    #[tokio::test]
    async fn test_extents_out_of_range() {
        let (_, transfer) = service(4 * SIZE, &["read"]);
        let mut backend = HalfZero { queries: vec![] };

        let err = transfer
            .zero_extents("t1", &mut backend, SIZE - 512, Some(1024))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Block(BlockError::InvalidOffset { .. })
        ));
        assert_eq!(err.status_code(), 416);
        assert!(backend.queries.is_empty());
    }
}
