//! Extent query backends
//!
//! [`ExtentBackend`] is the only capability the normalization engine needs
//! from a backend. A query may return less than requested, split into any
//! number of elements.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncSeekExt;
use tracing::{debug, trace};

use crate::error::{BlockError, BlockResult};
use crate::extent::{DirtyFlags, ExtentFlags, StatusExtent, ZeroFlags};
use crate::nbd::{
    dirty_bitmap_context, BlockDescriptor, BlockStatusReply, BASE_ALLOCATION, MAX_LENGTH,
};

/// Extent query capability
#[async_trait]
pub trait ExtentBackend<F: ExtentFlags>: Send {
    /// Size of the export in bytes
    fn export_size(&self) -> u64;

    /// Query extents starting at `offset`.
    ///
    /// `length` must be in `1..=MAX_LENGTH` and `offset + length` must not
    /// exceed the export size. The reply covers a prefix of the requested
    /// range, in offset order.
    async fn query_extents(&mut self, offset: u64, length: u64)
        -> BlockResult<Vec<StatusExtent<F>>>;
}

/// Validate a query against the export size
pub fn check_query(offset: u64, length: u64, size: u64) -> BlockResult<()> {
    if length == 0 || length > MAX_LENGTH {
        return Err(BlockError::InvalidLength { length });
    }
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(BlockError::InvalidOffset {
            offset,
            length,
            size,
        }),
    }
}

/// File backend
///
/// Files are treated as fully allocated; every query is answered with a
/// single data extent covering the whole request.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    size: u64,
}

impl FileBackend {
    /// Open a regular file or block device
    pub async fn open(path: impl AsRef<Path>) -> BlockResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = tokio::fs::File::open(&path).await?;
        // Block devices report zero length in their metadata
        let size = file.seek(SeekFrom::End(0)).await?;
        debug!("Opened file backend {} (size: {})", path.display(), size);
        Ok(Self { path, size })
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExtentBackend<ZeroFlags> for FileBackend {
    fn export_size(&self) -> u64 {
        self.size
    }

    async fn query_extents(
        &mut self,
        offset: u64,
        length: u64,
    ) -> BlockResult<Vec<StatusExtent<ZeroFlags>>> {
        check_query(offset, length, self.size)?;
        Ok(vec![StatusExtent::new(length, ZeroFlags::DATA)])
    }
}

/// Connected NBD client able to issue `NBD_CMD_BLOCK_STATUS`.
///
/// Implemented by the transport layer; handshake and meta context
/// negotiation happen before the client is handed to [`NbdBackend`].
#[async_trait]
pub trait BlockStatusClient: Send {
    /// Export size announced by the server
    fn export_size(&self) -> u64;

    /// Id of a negotiated meta context
    fn meta_context_id(&self, name: &str) -> Option<u32>;

    /// Send a block status command and return the payload of every
    /// block status chunk of the reply
    async fn block_status(&mut self, offset: u64, length: u32) -> BlockResult<Vec<Bytes>>;
}

/// NBD backend
pub struct NbdBackend<C> {
    client: C,
    dirty_bitmap: Option<String>,
}

impl<C: BlockStatusClient> NbdBackend<C> {
    /// Create a backend reporting allocation extents
    pub fn new(client: C) -> Self {
        Self {
            client,
            dirty_bitmap: None,
        }
    }

    /// Report dirty extents from a qemu dirty bitmap
    pub fn with_dirty_bitmap(mut self, bitmap: impl Into<String>) -> Self {
        self.dirty_bitmap = Some(bitmap.into());
        self
    }

    /// Get the underlying client
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Consume the backend, returning the client
    pub fn into_client(self) -> C {
        self.client
    }

    async fn query_context(
        &mut self,
        context: &str,
        offset: u64,
        length: u64,
    ) -> BlockResult<Vec<BlockDescriptor>> {
        check_query(offset, length, self.client.export_size())?;

        let context_id = self
            .client
            .meta_context_id(context)
            .ok_or_else(|| BlockError::MissingContext(context.to_string()))?;

        // check_query bounds length by MAX_LENGTH, which fits in u32
        let chunks = self.client.block_status(offset, length as u32).await?;
        trace!(
            "Block status {} offset={} len={} chunks={}",
            context,
            offset,
            length,
            chunks.len()
        );

        for chunk in &chunks {
            let reply = BlockStatusReply::parse(chunk)?;
            if reply.context_id == context_id {
                return Ok(reply.descriptors);
            }
        }

        Err(BlockError::Protocol(format!(
            "No block status reply for meta context {context}"
        )))
    }
}

#[async_trait]
impl<C: BlockStatusClient> ExtentBackend<ZeroFlags> for NbdBackend<C> {
    fn export_size(&self) -> u64 {
        self.client.export_size()
    }

    async fn query_extents(
        &mut self,
        offset: u64,
        length: u64,
    ) -> BlockResult<Vec<StatusExtent<ZeroFlags>>> {
        let descriptors = self.query_context(BASE_ALLOCATION, offset, length).await?;
        Ok(descriptors
            .into_iter()
            .map(|d| StatusExtent::new(d.length as u64, ZeroFlags::from_nbd_state(d.flags)))
            .collect())
    }
}

#[async_trait]
impl<C: BlockStatusClient> ExtentBackend<DirtyFlags> for NbdBackend<C> {
    fn export_size(&self) -> u64 {
        self.client.export_size()
    }

    async fn query_extents(
        &mut self,
        offset: u64,
        length: u64,
    ) -> BlockResult<Vec<StatusExtent<DirtyFlags>>> {
        let context = match &self.dirty_bitmap {
            Some(bitmap) => dirty_bitmap_context(bitmap),
            None => {
                return Err(BlockError::Unsupported(
                    "dirty extents require a dirty bitmap".to_string(),
                ))
            }
        };
        let descriptors = self.query_context(&context, offset, length).await?;
        Ok(descriptors
            .into_iter()
            .map(|d| StatusExtent::new(d.length as u64, DirtyFlags::from_nbd_state(d.flags)))
            .collect())
    }
}
