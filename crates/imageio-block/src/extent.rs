//! Image extents
//!
//! An extent is a contiguous byte range of an export tagged with a content
//! classification. Two classifications exist:
//!
//! - [`ZeroFlags`]: raw allocation state (`base:allocation`). Host-relative
//!   for file backends, guest-relative for NBD backends.
//! - [`DirtyFlags`]: change tracking state since a checkpoint
//!   (`qemu:dirty-bitmap:*`). Always guest-relative.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::nbd::{STATE_DIRTY, STATE_HOLE, STATE_ZERO};

/// Classification attached to an extent.
///
/// Two adjacent extents with equal flags describe one run and are merged by
/// the normalization engine.
pub trait ExtentFlags: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// True if the range may contain non-zero content
    fn data(&self) -> bool;
}

/// Allocation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZeroFlags {
    /// Range reads as zeroes
    pub zero: bool,
    /// Range is unallocated. `None` when the producer never reported holes
    /// (raw images, older servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole: Option<bool>,
}

impl ZeroFlags {
    /// Allocated data
    pub const DATA: Self = Self {
        zero: false,
        hole: Some(false),
    };

    /// Create new flags
    pub fn new(zero: bool, hole: Option<bool>) -> Self {
        Self { zero, hole }
    }

    /// Decode a `base:allocation` status word
    pub fn from_nbd_state(state: u32) -> Self {
        Self {
            zero: state & STATE_ZERO != 0,
            hole: Some(state & STATE_HOLE != 0),
        }
    }

    /// Check if the range is a hole; unknown counts as allocated
    pub fn is_hole(&self) -> bool {
        self.hole.unwrap_or(false)
    }
}

impl ExtentFlags for ZeroFlags {
    fn data(&self) -> bool {
        !self.zero
    }
}

/// Change tracking flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirtyFlags {
    /// Range changed since the checkpoint
    pub dirty: bool,
}

impl DirtyFlags {
    /// Create new flags
    pub fn new(dirty: bool) -> Self {
        Self { dirty }
    }

    /// Decode a `qemu:dirty-bitmap:*` status word
    pub fn from_nbd_state(state: u32) -> Self {
        Self {
            dirty: state & STATE_DIRTY != 0,
        }
    }
}

impl ExtentFlags for DirtyFlags {
    fn data(&self) -> bool {
        self.dirty
    }
}

/// One element of a backend reply. Replies carry no offsets, each element
/// starts where the previous one ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusExtent<F> {
    /// Length in bytes
    pub length: u64,
    /// Classification
    pub flags: F,
}

impl<F> StatusExtent<F> {
    /// Create a new reply element
    pub fn new(length: u64, flags: F) -> Self {
        Self { length, flags }
    }
}

/// Extent - a classified byte range of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent<F> {
    /// Offset in bytes
    pub start: u64,
    /// Length in bytes, never zero
    pub length: u64,
    /// Classification
    #[serde(flatten)]
    pub flags: F,
}

/// Allocation extent
pub type ZeroExtent = Extent<ZeroFlags>;

/// Change tracking extent
pub type DirtyExtent = Extent<DirtyFlags>;

impl<F: ExtentFlags> Extent<F> {
    /// Create a new extent
    pub fn with_flags(start: u64, length: u64, flags: F) -> Self {
        Self {
            start,
            length,
            flags,
        }
    }

    /// Get the end offset, saturating at `u64::MAX`
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    /// True if this extent may contain non-zero content
    pub fn data(&self) -> bool {
        self.flags.data()
    }
}

impl ZeroExtent {
    /// Create an allocation extent
    pub fn new(start: u64, length: u64, zero: bool, hole: Option<bool>) -> Self {
        Self::with_flags(start, length, ZeroFlags::new(zero, hole))
    }

    /// Check if the range reads as zeroes
    pub fn zero(&self) -> bool {
        self.flags.zero
    }

    /// Check if the range is unallocated
    pub fn is_hole(&self) -> bool {
        self.flags.is_hole()
    }
}

impl DirtyExtent {
    /// Create a change tracking extent
    pub fn new(start: u64, length: u64, dirty: bool) -> Self {
        Self::with_flags(start, length, DirtyFlags::new(dirty))
    }

    /// Check if the range changed since the checkpoint
    pub fn dirty(&self) -> bool {
        self.flags.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_extent_data() {
        let extent = ZeroExtent::new(0, 4096, true, Some(false));
        assert!(extent.zero());
        assert!(!extent.data());
        assert_eq!(extent.end(), 4096);

        let extent = ZeroExtent::new(4096, 4096, false, None);
        assert!(extent.data());
        assert!(!extent.is_hole());
    }

    #[test]
    fn test_dirty_extent_data() {
        assert!(DirtyExtent::new(0, 512, true).data());
        assert!(!DirtyExtent::new(0, 512, false).data());
    }

    #[test]
    fn test_zero_extent_json() {
        let extent = ZeroExtent::new(0, 65536, true, Some(true));
        let value = serde_json::to_value(extent).unwrap();
        assert_eq!(
            value,
            json!({"start": 0, "length": 65536, "zero": true, "hole": true})
        );
    }

    #[test]
    fn test_zero_extent_json_without_hole() {
        // Older servers never reported holes
        let extent: ZeroExtent =
            serde_json::from_value(json!({"start": 512, "length": 1024, "zero": false}))
                .unwrap();
        assert_eq!(extent.flags.hole, None);
        assert!(!extent.is_hole());
        assert_eq!(extent, ZeroExtent::new(512, 1024, false, None));

        let value = serde_json::to_value(extent).unwrap();
        assert!(value.get("hole").is_none());
    }

    #[test]
    fn test_dirty_extent_json() {
        let extent: DirtyExtent =
            serde_json::from_value(json!({"start": 0, "length": 1048576, "dirty": true}))
                .unwrap();
        assert_eq!(extent, DirtyExtent::new(0, 1048576, true));
        assert_eq!(
            serde_json::to_value(extent).unwrap(),
            json!({"start": 0, "length": 1048576, "dirty": true})
        );
    }

    #[test]
    fn test_end_saturates() {
        assert_eq!(ZeroExtent::new(4096, 512, false, None).end(), 4608);
        assert_eq!(ZeroExtent::new(u64::MAX - 1, 10, true, None).end(), u64::MAX);

        let extent: DirtyExtent =
            serde_json::from_value(json!({"start": u64::MAX, "length": 1, "dirty": false}))
                .unwrap();
        assert_eq!(extent.end(), u64::MAX);
    }

    #[test]
    fn test_flags_from_nbd_state() {
        let flags = ZeroFlags::from_nbd_state(STATE_HOLE | STATE_ZERO);
        assert!(flags.zero);
        assert!(flags.is_hole());

        assert_eq!(ZeroFlags::from_nbd_state(0), ZeroFlags::DATA);
        assert!(DirtyFlags::from_nbd_state(STATE_DIRTY).dirty);
        assert!(!DirtyFlags::from_nbd_state(0).dirty);
    }
}
