// # Buffer Frames
//
// Page-aligned buffers and the frame metadata the buffer pool wraps around
// them. The `RwLock` guarding each frame's data is the per-page latch:
// `read_data` is the page read latch, `write_data` the page write latch.

use crate::buffer::replacer::ClockReplacer;
use crate::common::{FrameId, PageId, INVALID_PAGE_ID};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Standard page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// Page-aligned buffer holding one page worth of bytes.
///
/// `#[repr(C, align(4096))]` keeps the buffer sector-aligned for direct
/// I/O and gives it a predictable layout.
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageBuffer {
    data: [u8; PAGE_SIZE],
}

impl PageBuffer {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page
    #[inline]
    pub fn zero(&mut self) {
        self.data.fill(0);
    }

    /// CRC32 checksum of the page contents
    #[inline]
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.data)
    }

    #[inline]
    pub fn verify_checksum(&self, expected: u32) -> bool {
        self.checksum() == expected
    }
}

impl Default for PageBuffer {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer frame metadata and state tracking.
///
/// Pin counts and flags use atomics so the hot pin/unpin path never takes
/// a lock; only page data access goes through the frame's latch.
pub struct BufferFrame {
    /// Frame ID (index in the pool's frame array)
    frame_id: FrameId,

    /// Page currently stored in this frame (INVALID_PAGE_ID if empty)
    page_id: AtomicU64,

    /// Number of concurrent users; 0 means the frame can be evicted
    pin_count: AtomicU32,

    /// Has the page been modified since it was loaded or last flushed?
    dirty: AtomicBool,

    /// Page data; the lock doubles as the per-page latch
    data: RwLock<PageBuffer>,
}

impl BufferFrame {
    #[inline]
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicU64::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(PageBuffer::new()),
        }
    }

    #[inline(always)]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    #[inline(always)]
    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    #[inline(always)]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Increment the pin count; returns the old count.
    #[inline(always)]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrement the pin count; returns the new count.
    #[inline(always)]
    pub fn unpin(&self) -> u32 {
        let old_count = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old_count > 0, "attempted to unpin an unpinned frame");
        old_count - 1
    }

    #[inline(always)]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Take the page read latch.
    #[inline]
    pub fn read_data(&self) -> RwLockReadGuard<'_, PageBuffer> {
        self.data.read()
    }

    /// Take the page write latch. Marks the frame dirty: the caller is
    /// assumed to mutate.
    #[inline]
    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageBuffer> {
        let guard = self.data.write();
        self.dirty.store(true, Ordering::Release);
        guard
    }

    /// Return the frame to the empty state. Page data is left as-is; the
    /// next occupant overwrites it.
    pub fn reset(&self) {
        self.page_id.store(INVALID_PAGE_ID, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id() == INVALID_PAGE_ID
    }
}

/// RAII pin on a buffer frame.
///
/// Dropping the guard unpins the frame; when the pin count returns to
/// zero the frame is installed in the clock replacer with its reference
/// bit set, making it evictable again with a second chance.
pub struct FrameGuard {
    frame: Arc<BufferFrame>,
    replacer: Arc<Mutex<ClockReplacer>>,
}

impl FrameGuard {
    pub(crate) fn new(frame: Arc<BufferFrame>, replacer: Arc<Mutex<ClockReplacer>>) -> Self {
        Self { frame, replacer }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    #[inline]
    pub fn read_data(&self) -> RwLockReadGuard<'_, PageBuffer> {
        self.frame.read_data()
    }

    #[inline]
    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageBuffer> {
        self.frame.write_data()
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.frame.set_dirty(true);
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.frame.unpin() == 0 {
            self.replacer.lock().unpin(self.frame.frame_id());
        }
    }
}
