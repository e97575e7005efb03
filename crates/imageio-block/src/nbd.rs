//! NBD block status protocol values
//!
//! Only the parts of the protocol needed to interpret `NBD_CMD_BLOCK_STATUS`
//! replies live here. Handshake and transmission framing belong to the NBD
//! client that feeds the backend.
//!
//! See https://github.com/NetworkBlockDevice/nbd/blob/master/doc/proto.md

use bytes::Buf;

use crate::error::{BlockError, BlockResult};

/// Maximum length of a single block status request.
///
/// The request length field is 32 bits wide; the limit is kept aligned to
/// 512 bytes since servers report extents in whole sectors.
pub const MAX_LENGTH: u64 = (4 << 30) - 512;

/// Allocation meta context
pub const BASE_ALLOCATION: &str = "base:allocation";

/// Prefix of the dirty bitmap meta contexts exported by qemu
pub const QEMU_DIRTY_BITMAP: &str = "qemu:dirty-bitmap:";

/// `base:allocation`: range is unallocated
pub const STATE_HOLE: u32 = 1 << 0;
/// `base:allocation`: range reads as zeroes
pub const STATE_ZERO: u32 = 1 << 1;
/// `qemu:dirty-bitmap:*`: range changed since the checkpoint
pub const STATE_DIRTY: u32 = 1 << 0;

/// Name of the dirty bitmap meta context for a bitmap
pub fn dirty_bitmap_context(bitmap: &str) -> String {
    format!("{QEMU_DIRTY_BITMAP}{bitmap}")
}

/// Block status descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Length in bytes
    pub length: u32,
    /// Status flags, meaning depends on the meta context
    pub flags: u32,
}

/// Decoded `NBD_REPLY_TYPE_BLOCK_STATUS` chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStatusReply {
    /// Meta context id negotiated with `NBD_OPT_SET_META_CONTEXT`
    pub context_id: u32,
    /// Descriptors in offset order
    pub descriptors: Vec<BlockDescriptor>,
}

impl BlockStatusReply {
    /// Parse a chunk payload
    pub fn parse(data: &[u8]) -> BlockResult<Self> {
        if data.len() < 4 + BlockDescriptor::SIZE {
            return Err(BlockError::Protocol(format!(
                "Block status payload too short: {} bytes",
                data.len()
            )));
        }
        if (data.len() - 4) % BlockDescriptor::SIZE != 0 {
            return Err(BlockError::Protocol(format!(
                "Block status payload has trailing bytes: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let context_id = buf.get_u32();
        let mut descriptors = Vec::with_capacity(buf.remaining() / BlockDescriptor::SIZE);
        while buf.has_remaining() {
            let length = buf.get_u32();
            let flags = buf.get_u32();
            descriptors.push(BlockDescriptor { length, flags });
        }

        Ok(Self {
            context_id,
            descriptors,
        })
    }
}

impl BlockDescriptor {
    /// Descriptor size (always 8 bytes)
    pub const SIZE: usize = 8;
}
