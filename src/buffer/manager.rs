// # Buffer Pool Manager
//
// Fixed array of frames fronted by a page table, a free list, and the
// clock replacer. Fetching or creating a page pins its frame and hands
// back a FrameGuard; the guard's drop unpins and re-installs the frame
// in the clock.

use crate::buffer::frame::{BufferFrame, FrameGuard, PAGE_SIZE};
use crate::buffer::replacer::ClockReplacer;
use crate::common::{FrameId, PageId, INVALID_PAGE_ID};
use crate::error::{DbError, Result};
use crate::storage::disk::DiskManager;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Point-in-time counters for the buffer pool
#[derive(Debug, Clone, Default)]
pub struct BufferPoolStats {
    pub total_frames: usize,
    pub free_frames: usize,
    pub evictable_frames: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub flushes: u64,
}

pub struct BufferPoolManager {
    frames: Vec<Arc<BufferFrame>>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    replacer: Arc<Mutex<ClockReplacer>>,
    disk: Arc<DiskManager>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk: Arc<DiskManager>) -> Self {
        debug_assert_eq!(disk.page_size, PAGE_SIZE);

        let frames: Vec<Arc<BufferFrame>> = (0..pool_size)
            .map(|i| Arc::new(BufferFrame::new(i as FrameId)))
            .collect();
        // Pop order matches frame order: lowest ids hand out first.
        let free_list: Vec<FrameId> = (0..pool_size as FrameId).rev().collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::with_capacity(pool_size)),
            free_list: Mutex::new(free_list),
            replacer: Arc::new(Mutex::new(ClockReplacer::new(pool_size))),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Allocate a fresh page on disk and pin it in a zeroed frame.
    ///
    /// The new page is marked dirty so its (zeroed) contents reach disk
    /// even if the caller never writes to it.
    pub fn new_page(&self) -> Result<FrameGuard> {
        let mut table = self.page_table.write();
        let frame_id = self.obtain_frame(&mut table)?;
        let page_id = self.disk.allocate_page()?;

        let frame = &self.frames[frame_id as usize];
        frame.set_page_id(page_id);
        frame.pin();
        frame.write_data().zero();

        table.insert(page_id, frame_id);
        trace!(page_id, frame_id, "allocated new page");
        Ok(FrameGuard::new(frame.clone(), self.replacer.clone()))
    }

    /// Pin a page, loading it from disk on a miss.
    pub fn fetch_page(&self, page_id: PageId) -> Result<FrameGuard> {
        if page_id == INVALID_PAGE_ID {
            return Err(DbError::PageNotFound(page_id));
        }

        // Fast path: page resident.
        {
            let table = self.page_table.read();
            if let Some(&frame_id) = table.get(&page_id) {
                let frame = &self.frames[frame_id as usize];
                frame.pin();
                self.replacer.lock().pin(frame_id);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(FrameGuard::new(frame.clone(), self.replacer.clone()));
            }
        }

        // Slow path: page fault.
        let mut table = self.page_table.write();
        // Re-check: another thread may have brought the page in.
        if let Some(&frame_id) = table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            frame.pin();
            self.replacer.lock().pin(frame_id);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(FrameGuard::new(frame.clone(), self.replacer.clone()));
        }

        let frame_id = self.obtain_frame(&mut table)?;
        let frame = &self.frames[frame_id as usize];
        frame.set_page_id(page_id);
        frame.pin();
        {
            let mut data = frame.write_data();
            self.disk.read_page(page_id, data.data_mut())?;
        }
        frame.set_dirty(false);

        table.insert(page_id, frame_id);
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(FrameGuard::new(frame.clone(), self.replacer.clone()))
    }

    /// Write a resident dirty page back to disk. A page that is not
    /// resident has already been written out by eviction; that is not an
    /// error.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let table = self.page_table.read();
        if let Some(&frame_id) = table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(page_id, data.data())?;
                drop(data);
                frame.set_dirty(false);
                self.flushes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Write every resident dirty page back to disk.
    pub fn flush_all(&self) -> Result<()> {
        let table = self.page_table.read();
        for (&page_id, &frame_id) in table.iter() {
            let frame = &self.frames[frame_id as usize];
            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(page_id, data.data())?;
                drop(data);
                frame.set_dirty(false);
                self.flushes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Drop a page from the pool and deallocate it on disk.
    ///
    /// Fails with `PagePinned` while any guard for the page is alive. The
    /// page need not be resident: its disk id is deallocated either way.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut table = self.page_table.write();
        if let Some(&frame_id) = table.get(&page_id) {
            let frame = &self.frames[frame_id as usize];
            if frame.is_pinned() {
                return Err(DbError::PagePinned(page_id));
            }
            table.remove(&page_id);
            self.replacer.lock().pin(frame_id);
            frame.reset();
            self.free_list.lock().push(frame_id);
        }
        self.disk.deallocate_page(page_id)?;
        trace!(page_id, "deleted page");
        Ok(())
    }

    /// Find a frame for a new occupant: free list first, then a clock
    /// victim (flushing it if dirty). Caller holds the page table write
    /// lock, which keeps the chosen frame from being re-pinned under us.
    fn obtain_frame(&self, table: &mut HashMap<PageId, FrameId>) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        let mut replacer = self.replacer.lock();
        let mut empty_revolutions = 0;
        loop {
            let Some(victim_id) = replacer.victim() else {
                empty_revolutions += 1;
                if empty_revolutions == 2 {
                    return Err(DbError::Buffer(
                        "no frame available for eviction: all pages pinned".into(),
                    ));
                }
                continue;
            };
            empty_revolutions = 0;
            replacer.pin(victim_id);

            let frame = &self.frames[victim_id as usize];
            // A guard drop can install a frame that was concurrently
            // re-pinned; skip it, its next unpin re-installs it.
            if frame.is_pinned() {
                continue;
            }

            if frame.is_dirty() {
                let data = frame.read_data();
                self.disk.write_page(frame.page_id(), data.data())?;
                drop(data);
                self.flushes.fetch_add(1, Ordering::Relaxed);
            }

            let old_page_id = frame.page_id();
            if old_page_id != INVALID_PAGE_ID {
                table.remove(&old_page_id);
            }
            frame.reset();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(victim_id, old_page_id, "evicted frame");
            return Ok(victim_id);
        }
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            total_frames: self.frames.len(),
            free_frames: self.free_list.lock().len(),
            evictable_frames: self.replacer.lock().size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pool(size: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path(), PAGE_SIZE).unwrap();
        (BufferPoolManager::new(size, Arc::new(disk)), dir)
    }

    #[test]
    fn new_pages_get_distinct_ids() {
        let (bp, _dir) = pool(10);
        let a = bp.new_page().unwrap();
        let b = bp.new_page().unwrap();
        assert_ne!(a.page_id(), b.page_id());
    }

    #[test]
    fn data_survives_eviction() {
        let (bp, _dir) = pool(3);

        let mut ids = Vec::new();
        for i in 0..10u8 {
            let guard = bp.new_page().unwrap();
            guard.write_data().data_mut()[0] = i;
            ids.push(guard.page_id());
        }

        for (i, &page_id) in ids.iter().enumerate() {
            let guard = bp.fetch_page(page_id).unwrap();
            assert_eq!(guard.read_data().data()[0], i as u8);
        }

        assert!(bp.stats().evictions > 0);
    }

    #[test]
    fn pool_exhaustion_is_an_error() {
        let (bp, _dir) = pool(3);

        let _g0 = bp.new_page().unwrap();
        let _g1 = bp.new_page().unwrap();
        let _g2 = bp.new_page().unwrap();
        assert!(matches!(bp.new_page(), Err(DbError::Buffer(_))));
    }

    #[test]
    fn delete_refuses_pinned_pages() {
        let (bp, _dir) = pool(4);

        let guard = bp.new_page().unwrap();
        let page_id = guard.page_id();
        assert!(matches!(
            bp.delete_page(page_id),
            Err(DbError::PagePinned(_))
        ));

        drop(guard);
        bp.delete_page(page_id).unwrap();
        // The disk id is free for reuse.
        assert_eq!(bp.disk().allocate_page().unwrap(), page_id);
    }

    #[test]
    fn flush_persists_through_reopen() {
        let dir = tempdir().unwrap();
        let page_id;
        {
            let disk = DiskManager::new(dir.path(), PAGE_SIZE).unwrap();
            let bp = BufferPoolManager::new(4, Arc::new(disk));
            let guard = bp.new_page().unwrap();
            page_id = guard.page_id();
            guard.write_data().data_mut()[7] = 0x7E;
            drop(guard);
            bp.flush_page(page_id).unwrap();
        }
        {
            let disk = DiskManager::new(dir.path(), PAGE_SIZE).unwrap();
            let bp = BufferPoolManager::new(4, Arc::new(disk));
            let guard = bp.fetch_page(page_id).unwrap();
            assert_eq!(guard.read_data().data()[7], 0x7E);
        }
    }
}
