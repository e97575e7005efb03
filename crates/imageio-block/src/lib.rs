//! Image extents for imageio transfers
//!
//! This crate reports which parts of a virtual disk hold data, read as
//! zeroes, or changed since a checkpoint, so transfers can skip what they
//! do not need to copy.
//!
//! # Architecture
//!
//! ```text
//!   ┌───────────────┐
//!   │ ExtentWalker  │  paging, clipping, run-length merge
//!   └───────┬───────┘
//!           │ ExtentBackend::query_extents
//!     ┌─────┴──────┐
//!     │            │
//! ┌───▼────┐  ┌────▼──────┐
//! │  File  │  │    NBD    │ ── BlockStatusClient (transport)
//! └────────┘  └───────────┘
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod engine;
pub mod error;
pub mod extent;
pub mod nbd;

pub use backend::{check_query, BlockStatusClient, ExtentBackend, FileBackend, NbdBackend};
pub use engine::ExtentWalker;
pub use error::{BlockError, BlockResult};
pub use extent::{
    DirtyExtent, DirtyFlags, Extent, ExtentFlags, StatusExtent, ZeroExtent, ZeroFlags,
};
pub use nbd::{BlockDescriptor, BlockStatusReply, MAX_LENGTH};
