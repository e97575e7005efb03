//! Extent normalization
//!
//! Backends answer extent queries in whatever shape is convenient for them:
//! short replies, replies split into many small extents, or a last extent
//! running past the requested range. [`ExtentWalker`] pages through a
//! backend and turns those replies into one canonical sequence:
//!
//! - extents are in offset order and cover `[offset, offset + length)`
//!   exactly, without gaps or overlaps
//! - adjacent extents never share the same flags; runs are merged even
//!   across reply boundaries
//! - nothing past the requested range is ever emitted
//!
//! The walker is pull based and holds nothing but its cursor and the
//! unconsumed part of the last reply. Dropping it mid-sequence leaves the
//! backend untouched; walking again starts a new independent traversal.

use std::collections::VecDeque;

use tracing::trace;

use crate::backend::ExtentBackend;
use crate::error::{BlockError, BlockResult};
use crate::extent::{Extent, ExtentFlags, StatusExtent};
use crate::nbd::MAX_LENGTH;

/// Cursor over the normalized extents of a range
pub struct ExtentWalker<'a, F, B: ?Sized> {
    backend: &'a mut B,
    /// Start of the next unconsumed byte
    pos: u64,
    /// End of the requested range
    end: u64,
    /// Upper bound of a single backend query
    max_length: u64,
    /// Unconsumed part of the last reply
    reply: VecDeque<StatusExtent<F>>,
    /// Extent being merged, not yet emitted
    pending: Option<Extent<F>>,
    done: bool,
}

impl<'a, F, B> ExtentWalker<'a, F, B>
where
    F: ExtentFlags,
    B: ExtentBackend<F> + ?Sized,
{
    /// Walk `[offset, offset + length)`, or up to the end of the export when
    /// `length` is `None`.
    pub fn new(backend: &'a mut B, offset: u64, length: Option<u64>) -> BlockResult<Self> {
        let size = backend.export_size();
        let length = match length {
            Some(length) => length,
            None => size.saturating_sub(offset),
        };
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= size)
            .ok_or(BlockError::InvalidOffset {
                offset,
                length,
                size,
            })?;

        Ok(Self {
            backend,
            pos: offset,
            end,
            max_length: MAX_LENGTH,
            reply: VecDeque::new(),
            pending: None,
            done: false,
        })
    }

    /// Limit the length of a single backend query, clamped to `1..=MAX_LENGTH`
    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.max_length = max_length.clamp(1, MAX_LENGTH);
        self
    }

    /// Get the next extent.
    ///
    /// Returns `None` once the range is covered. After an error the walker
    /// is exhausted.
    pub async fn next(&mut self) -> Option<BlockResult<Extent<F>>> {
        if self.done {
            return None;
        }

        match self.advance().await {
            Ok(Some(extent)) => Some(Ok(extent)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Collect the remaining extents
    pub async fn collect(mut self) -> BlockResult<Vec<Extent<F>>> {
        let mut extents = Vec::new();
        while let Some(extent) = self.next().await {
            extents.push(extent?);
        }
        Ok(extents)
    }

    async fn advance(&mut self) -> BlockResult<Option<Extent<F>>> {
        while let Some((start, status)) = self.next_status().await? {
            if let Some(pending) = self.pending.as_mut() {
                if pending.flags == status.flags {
                    pending.length += status.length;
                    continue;
                }
            }

            let extent = Extent::with_flags(start, status.length, status.flags);
            if let Some(done) = self.pending.replace(extent) {
                return Ok(Some(done));
            }
        }

        Ok(self.pending.take())
    }

    /// Consume the next reply element, querying the backend when the last
    /// reply is used up. Returns the element with its start offset.
    async fn next_status(&mut self) -> BlockResult<Option<(u64, StatusExtent<F>)>> {
        if self.reply.is_empty() {
            if self.pos == self.end {
                return Ok(None);
            }
            self.fetch().await?;
        }

        let Some(mut status) = self.reply.pop_front() else {
            return Ok(None);
        };

        let remaining = self.end - self.pos;
        if status.length > remaining {
            // Only the last element of a reply may run past the range
            if !self.reply.is_empty() {
                return Err(BlockError::Protocol(format!(
                    "Extent at {} length {} exceeds requested range ending at {}",
                    self.pos, status.length, self.end
                )));
            }
            if remaining == 0 {
                return Ok(None);
            }
            status.length = remaining;
        }

        let start = self.pos;
        self.pos += status.length;
        Ok(Some((start, status)))
    }

    async fn fetch(&mut self) -> BlockResult<()> {
        let length = (self.end - self.pos).min(self.max_length);
        let reply = self.backend.query_extents(self.pos, length).await?;
        trace!(
            "Extent query offset={} len={} extents={}",
            self.pos,
            length,
            reply.len()
        );

        if reply.is_empty() {
            return Err(BlockError::Protocol(format!(
                "Empty extent reply for offset {} length {}",
                self.pos, length
            )));
        }
        if reply.iter().any(|status| status.length == 0) {
            return Err(BlockError::Protocol(format!(
                "Zero length extent in reply for offset {}",
                self.pos
            )));
        }

        self.reply.extend(reply);
        Ok(())
    }
}
