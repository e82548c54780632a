//! Error types for every subsystem, each carrying the exact negative
//! contract code documented for it.
//!
//! Internal code always propagates these with `Result`/`?`; the `.code()`
//! method exists only for callers (and tests) that need the literal integer
//! the external contract promises.

use core::fmt;

/// Errors returned by the frame allocator (`ram`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamError {
    /// `size` is not a positive power of two.
    BadSize,
    /// `frame_size` is not a positive power of two, or exceeds `size`.
    BadFrameSize,
    /// The backing buffer is the wrong length, or was not all-zero.
    BadMemory,
    /// The region is too small to hold its own descriptor and bitmap.
    RegionTooSmall,
    /// The region has not been initialized yet.
    NotInitialized,
    /// No run of `n` contiguous free frames exists.
    OutOfSpace,
    /// `n` is zero, or otherwise not a valid run length.
    InvalidArgument,
}

impl RamError {
    /// The literal negative code from the external contract.
    pub fn code(self) -> i32 {
        match self {
            Self::BadSize => -1,
            Self::BadFrameSize => -2,
            Self::BadMemory => -3,
            Self::RegionTooSmall => -4,
            Self::NotInitialized => -1,
            Self::OutOfSpace => -1,
            Self::InvalidArgument => -1,
        }
    }
}

impl fmt::Display for RamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSize => write!(f, "region size must be a positive power of two"),
            Self::BadFrameSize => write!(f, "frame size must be a positive power of two no larger than the region"),
            Self::BadMemory => write!(f, "memory buffer is null, wrong size, or not zeroed"),
            Self::RegionTooSmall => write!(f, "region is too small to hold its own descriptor and bitmap"),
            Self::NotInitialized => write!(f, "region is not initialized"),
            Self::OutOfSpace => write!(f, "no contiguous run of free frames satisfies the request"),
            Self::InvalidArgument => write!(f, "invalid run length"),
        }
    }
}

impl std::error::Error for RamError {}

/// Errors returned by the task registry (`task`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// No free slot in the registry.
    NoFreeSlot,
    /// Template page table or address-space buffer was invalid.
    InvalidArgument,
    /// Registry has not been initialized.
    NotInitialized,
    /// No live task with the given pid.
    NotFound,
    /// The region is not initialized (registry allocation depends on it).
    RegionNotInitialized,
}

impl TaskError {
    pub fn code(self) -> i32 {
        match self {
            Self::NoFreeSlot => -1,
            Self::InvalidArgument => -2,
            Self::NotInitialized => -3,
            Self::NotFound => -1,
            Self::RegionNotInitialized => -1,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFreeSlot => write!(f, "no free task slot"),
            Self::InvalidArgument => write!(f, "invalid template page table or address space"),
            Self::NotInitialized => write!(f, "task registry is not initialized"),
            Self::NotFound => write!(f, "no live task with that pid"),
            Self::RegionNotInitialized => write!(f, "region is not initialized"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Errors returned by the MMU (`mmu`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuError {
    /// Access denied by the entry's protection bits even though resident.
    AccessViolation,
    /// Entry is accessible but not resident (`p_bit == 0`).
    PageFault,
    /// Entry has all-zero protection, or the page index is out of range.
    SegmentationFault,
    /// No active page table has been set.
    NoActivePageTable,
    /// The region is not initialized.
    RegionNotInitialized,
}

impl MmuError {
    pub fn code(self) -> i32 {
        match self {
            Self::AccessViolation => -3,
            Self::PageFault => -1,
            Self::SegmentationFault => -2,
            Self::NoActivePageTable => -4,
            Self::RegionNotInitialized => -5,
        }
    }
}

impl fmt::Display for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessViolation => write!(f, "access denied by page protection bits"),
            Self::PageFault => write!(f, "page is not resident"),
            Self::SegmentationFault => write!(f, "segmentation fault"),
            Self::NoActivePageTable => write!(f, "no active page table"),
            Self::RegionNotInitialized => write!(f, "region is not initialized"),
        }
    }
}

impl std::error::Error for MmuError {}

/// Errors returned by the pager (`pager`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerError {
    /// The task or region could not be found / is not initialized.
    NotFound,
    /// The page is already resident.
    AlreadyResident,
    /// No frame could be obtained and no victim could be evicted.
    OutOfResources,
    /// Page index out of range, or the entry has all-zero protection.
    SegmentationFault,
}

impl PagerError {
    pub fn code(self) -> i32 {
        match self {
            Self::NotFound => -1,
            Self::AlreadyResident => -2,
            Self::OutOfResources => -3,
            Self::SegmentationFault => -4,
        }
    }
}

impl fmt::Display for PagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "task or region not found"),
            Self::AlreadyResident => write!(f, "page is already resident"),
            Self::OutOfResources => write!(f, "out of resources: no frame available and nothing to evict"),
            Self::SegmentationFault => write!(f, "segmentation fault"),
        }
    }
}

impl std::error::Error for PagerError {}
