use crate::common::PageId;
use crate::error::{DbError, Result};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed page store.
///
/// Pages live at offset `page_id * page_size` inside a single data file.
/// Allocation hands out monotonically growing page ids, reusing
/// deallocated ids from an in-memory free list first. All file access is
/// serialized through a mutex; callers needing parallelism keep pages in
/// the buffer pool and only come here on a miss or a flush.
pub struct DiskManager {
    data_file: Mutex<File>,
    pub page_size: usize,
    next_page_id: Mutex<PageId>,
    free_pages: Mutex<Vec<PageId>>,
    stats: RwLock<DiskStats>,
}

/// Read/write counters for the disk manager
#[derive(Debug, Clone, Default)]
pub struct DiskStats {
    pub reads: u64,
    pub writes: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

impl DiskManager {
    /// Open (or create) the data file under `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        std::fs::create_dir_all(data_dir.as_ref())?;

        let mut path = PathBuf::from(data_dir.as_ref());
        path.push("data.db");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let num_pages = file.metadata()?.len() / page_size as u64;

        debug!(path = %path.display(), num_pages, "opened data file");

        Ok(Self {
            data_file: Mutex::new(file),
            page_size,
            next_page_id: Mutex::new(num_pages),
            free_pages: Mutex::new(Vec::new()),
            stats: RwLock::new(DiskStats::default()),
        })
    }

    /// Read a page into `buf`. A page that was allocated but never written
    /// reads back as zeroes (short reads zero-fill).
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.page_size {
            return Err(DbError::Storage(format!(
                "read buffer is {} bytes, page size is {}",
                buf.len(),
                self.page_size
            )));
        }

        let mut file = self.data_file.lock();
        file.seek(SeekFrom::Start(page_id * self.page_size as u64))?;

        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf[total..].fill(0);

        self.stats.write().reads += 1;
        Ok(())
    }

    /// Write a full page at its offset.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        if buf.len() != self.page_size {
            return Err(DbError::Storage(format!(
                "write buffer is {} bytes, page size is {}",
                buf.len(),
                self.page_size
            )));
        }

        let mut file = self.data_file.lock();
        file.seek(SeekFrom::Start(page_id * self.page_size as u64))?;
        file.write_all(buf)?;

        self.stats.write().writes += 1;
        Ok(())
    }

    /// Hand out a page id, preferring previously deallocated ones.
    pub fn allocate_page(&self) -> Result<PageId> {
        self.stats.write().allocations += 1;
        if let Some(page_id) = self.free_pages.lock().pop() {
            return Ok(page_id);
        }
        let mut next = self.next_page_id.lock();
        let page_id = *next;
        *next += 1;
        Ok(page_id)
    }

    /// Return a page id to the free list for reuse.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.stats.write().deallocations += 1;
        self.free_pages.lock().push(page_id);
        Ok(())
    }

    /// Number of pages ever allocated from the end of the file.
    pub fn num_pages(&self) -> u64 {
        *self.next_page_id.lock()
    }

    /// Flush file buffers to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.data_file.lock();
        file.sync_all()?;
        Ok(())
    }

    pub fn stats(&self) -> DiskStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAGE: usize = 4096;

    #[test]
    fn write_then_read_round_trip() -> Result<()> {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path(), PAGE)?;

        let page_id = dm.allocate_page()?;
        let mut buf = vec![0u8; PAGE];
        buf[0] = 0xAB;
        buf[PAGE - 1] = 0xCD;
        dm.write_page(page_id, &buf)?;

        let mut out = vec![0u8; PAGE];
        dm.read_page(page_id, &mut out)?;
        assert_eq!(out, buf);
        Ok(())
    }

    #[test]
    fn fresh_page_reads_zeroed() -> Result<()> {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path(), PAGE)?;

        let page_id = dm.allocate_page()?;
        let mut out = vec![0xFFu8; PAGE];
        dm.read_page(page_id, &mut out)?;
        assert!(out.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn deallocated_ids_are_reused() -> Result<()> {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path(), PAGE)?;

        let a = dm.allocate_page()?;
        let b = dm.allocate_page()?;
        assert_ne!(a, b);

        dm.deallocate_page(a)?;
        assert_eq!(dm.allocate_page()?, a);
        Ok(())
    }

    #[test]
    fn rejects_wrong_buffer_size() {
        let dir = tempdir().unwrap();
        let dm = DiskManager::new(dir.path(), PAGE).unwrap();
        let mut small = vec![0u8; 16];
        assert!(dm.read_page(0, &mut small).is_err());
        assert!(dm.write_page(0, &small).is_err());
    }
}
