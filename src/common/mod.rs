// Shared identifiers used across the storage, buffer, and index modules.

/// Unique identifier for pages in storage
pub type PageId = u64;

/// Index of a frame inside the buffer pool
pub type FrameId = u32;

/// Log sequence number recorded in page headers
pub type Lsn = u64;

/// Invalid page ID sentinel
pub const INVALID_PAGE_ID: PageId = u64::MAX;
