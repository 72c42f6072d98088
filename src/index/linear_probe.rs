// # Linear-Probing Hash Table
//
// Disk-backed hash index over block pages named by a header page. Probe
// sequences run `h(k) mod size, +1, +1, ...` with wrap-around; removal
// tombstones slots (occupied stays set) so chains keep forwarding.
//
// Latching is two-level: a table-wide reader/writer latch (readers:
// lookup, insert, remove; writer: resize) above per-page latches taken
// one probe step at a time. Page latches are never held across steps,
// so no latch cycle is constructible.

use crate::buffer::manager::BufferPoolManager;
use crate::common::PageId;
use crate::error::{DbError, Result};
use crate::index::block_page::BlockPage;
use crate::index::header_page::HeaderPage;
use crate::index::key::{FixedWidth, KeyComparator, KeyHasher};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Result of one probe pass in `insert_inner`.
enum InsertOutcome {
    Inserted,
    Duplicate,
    /// Full revolution without a claim; carries the size that was probed.
    Full(u64),
}

/// Header fields copied out under the table latch. Stable for the whole
/// operation because only `resize` (table writer) mutates the header.
struct HeaderSnapshot {
    size: u64,
    block_ids: Vec<PageId>,
}

pub struct LinearProbeHashTable<K, V, C, H> {
    name: String,
    pool: Arc<BufferPoolManager>,
    comparator: C,
    hasher: H,
    table_latch: RwLock<()>,
    header_page_id: PageId,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C, H> LinearProbeHashTable<K, V, C, H>
where
    K: FixedWidth,
    V: FixedWidth + PartialEq,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Create a fresh index with at least `num_buckets` slots.
    ///
    /// Allocates the header page and enough block pages to cover the
    /// buckets; every new page is flushed immediately so it survives
    /// eviction.
    pub fn new(
        name: impl Into<String>,
        pool: Arc<BufferPoolManager>,
        comparator: C,
        num_buckets: usize,
        hasher: H,
    ) -> Result<Self> {
        if num_buckets == 0 {
            return Err(DbError::Storage(
                "hash table needs at least one bucket".into(),
            ));
        }
        let header_page_id = {
            let guard = pool
                .new_page()
                .map_err(|e| DbError::Buffer(format!("cannot allocate header page: {e}")))?;
            guard.page_id()
        };

        let table = Self {
            name: name.into(),
            pool,
            comparator,
            hasher,
            table_latch: RwLock::new(()),
            header_page_id,
            _marker: PhantomData,
        };

        {
            let guard = table.pool.fetch_page(header_page_id)?;
            let mut page = guard.write_data();
            let mut header = HeaderPage::new(page.data_mut());
            header.set_page_id(header_page_id);
            header.set_lsn(0);
            header.set_size(num_buckets as u64);
            table.append_blocks(&mut header, num_buckets as u64)?;
            drop(page);
            drop(guard);
            table.pool.flush_page(header_page_id)?;
        }

        debug!(
            table = %table.name,
            header_page_id,
            num_buckets,
            "created linear-probe hash table"
        );
        Ok(table)
    }

    /// Slots per block page for this key/value instantiation.
    pub fn block_array_size() -> usize {
        BlockPage::<&[u8], K, V>::num_slots()
    }

    /// Collect every value stored under `key`.
    ///
    /// "Found" is equivalent to the result being non-empty.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let _table = self.table_latch.read();
        self.get_value_inner(key)
    }

    /// Insert `(key, value)`; returns `false` if the exact pair is
    /// already present.
    ///
    /// A probe that completes a full revolution without claiming a slot
    /// releases the table latch, doubles the table, and retries.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        loop {
            let probed_size = {
                let _table = self.table_latch.read();
                match self.insert_inner(key, value)? {
                    InsertOutcome::Inserted => return Ok(true),
                    InsertOutcome::Duplicate => return Ok(false),
                    InsertOutcome::Full(size) => size,
                }
            };
            debug!(table = %self.name, size = probed_size, "table full, growing");
            self.resize(probed_size as usize)?;
        }
    }

    /// Remove exactly `(key, value)`. A pair with the same key but a
    /// different value is skipped and the probe continues past it.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let _table = self.table_latch.read();
        let snap = self.header_snapshot()?;
        let n = Self::block_array_size() as u64;
        let start = self.hasher.hash_key(key) % snap.size;
        let mut index = start;
        let mut wrapped = false;
        loop {
            if index == start {
                if wrapped {
                    break;
                }
                wrapped = true;
            }

            let offset = (index % n) as usize;
            let guard = self.pool.fetch_page(snap.block_ids[(index / n) as usize])?;
            let mut page = guard.write_data();
            let mut block = BlockPage::<_, K, V>::new(page.data_mut());

            if !block.is_occupied(offset) {
                break;
            }
            if block.is_readable(offset)
                && self.comparator.compare(key, &block.key_at(offset)?) == Ordering::Equal
                && block.value_at(offset)? == *value
            {
                block.remove(offset);
                return Ok(true);
            }

            drop(page);
            drop(guard);
            index = (index + 1) % snap.size;
        }
        Ok(false)
    }

    /// Grow the table to `2 * initial_size` slots and migrate every live
    /// pair. The table only ever grows: a target at or below the current
    /// size is a no-op.
    pub fn resize(&self, initial_size: usize) -> Result<()> {
        let _table = self.table_latch.write();
        self.resize_inner(initial_size as u64)
    }

    /// Current logical slot count.
    pub fn size(&self) -> Result<u64> {
        let _table = self.table_latch.read();
        Ok(self.header_snapshot()?.size)
    }

    /// Slot index `h(key) mod size` the probe sequence starts at.
    pub fn slot_index(&self, key: &K) -> Result<u64> {
        let _table = self.table_latch.read();
        let snap = self.header_snapshot()?;
        Ok(self.hasher.hash_key(key) % snap.size)
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Number of block pages behind the table.
    pub fn num_blocks(&self) -> Result<usize> {
        let _table = self.table_latch.read();
        Ok(self.header_snapshot()?.block_ids.len())
    }

    /// Page id of the `index`-th block page.
    pub fn block_page_id(&self, index: usize) -> Result<PageId> {
        let _table = self.table_latch.read();
        let snap = self.header_snapshot()?;
        snap.block_ids
            .get(index)
            .copied()
            .ok_or_else(|| DbError::Storage(format!("no block page at index {index}")))
    }

    fn header_snapshot(&self) -> Result<HeaderSnapshot> {
        let guard = self.pool.fetch_page(self.header_page_id)?;
        let page = guard.read_data();
        let header = HeaderPage::new(page.data());
        let size = header.size();
        let block_ids = (0..header.num_blocks())
            .map(|i| header.block_page_id(i))
            .collect();
        Ok(HeaderSnapshot { size, block_ids })
    }

    /// Lookup body shared by `get_value` and the insert duplicate check.
    /// Caller holds the table latch in either mode.
    fn get_value_inner(&self, key: &K) -> Result<Vec<V>> {
        let snap = self.header_snapshot()?;
        let mut result = Vec::new();
        let n = Self::block_array_size() as u64;
        let start = self.hasher.hash_key(key) % snap.size;
        let mut index = start;
        let mut wrapped = false;
        loop {
            if index == start {
                if wrapped {
                    break;
                }
                wrapped = true;
            }

            let offset = (index % n) as usize;
            let guard = self.pool.fetch_page(snap.block_ids[(index / n) as usize])?;
            let page = guard.read_data();
            let block = BlockPage::<_, K, V>::new(page.data());

            if !block.is_occupied(offset) {
                // End of the probe chain: this slot was never written.
                break;
            }
            if block.is_readable(offset)
                && self.comparator.compare(key, &block.key_at(offset)?) == Ordering::Equal
            {
                result.push(block.value_at(offset)?);
            }

            drop(page);
            drop(guard);
            index = (index + 1) % snap.size;
        }
        Ok(result)
    }

    /// Insert body. Caller holds the table latch in either mode; resize
    /// calls this under its write latch to migrate pairs without
    /// re-acquiring the latch.
    fn insert_inner(&self, key: &K, value: &V) -> Result<InsertOutcome> {
        if self.get_value_inner(key)?.iter().any(|v| v == value) {
            return Ok(InsertOutcome::Duplicate);
        }

        let snap = self.header_snapshot()?;
        let n = Self::block_array_size() as u64;
        let start = self.hasher.hash_key(key) % snap.size;
        let mut index = start;
        let mut wrapped = false;
        loop {
            if index == start {
                if wrapped {
                    return Ok(InsertOutcome::Full(snap.size));
                }
                wrapped = true;
            }

            let block_id = snap.block_ids[(index / n) as usize];
            let offset = (index % n) as usize;
            let guard = self.pool.fetch_page(block_id)?;
            let mut page = guard.write_data();
            let mut block = BlockPage::<_, K, V>::new(page.data_mut());

            if block.insert(offset, key, value) {
                drop(page);
                // Keep the pin while flushing so the page stays resident.
                self.pool.flush_page(block_id)?;
                drop(guard);
                return Ok(InsertOutcome::Inserted);
            }

            drop(page);
            drop(guard);
            index = (index + 1) % snap.size;
        }
    }

    fn resize_inner(&self, initial_size: u64) -> Result<()> {
        let target = initial_size * 2;
        let old_ids: Vec<PageId> = {
            let guard = self.pool.fetch_page(self.header_page_id)?;
            let mut page = guard.write_data();
            let mut header = HeaderPage::new(page.data_mut());
            if header.size() >= target {
                return Ok(());
            }
            let old_size = header.size();
            let old_ids = (0..header.num_blocks())
                .map(|i| header.block_page_id(i))
                .collect();
            header.set_size(target);
            header.reset_block_index();
            self.append_blocks(&mut header, target)?;
            debug!(
                table = %self.name,
                old_size,
                new_size = target,
                "resizing hash table"
            );
            drop(page);
            drop(guard);
            self.pool.flush_page(self.header_page_id)?;
            old_ids
        };

        for old_id in old_ids {
            // Copy the live pairs out so only one page latch is ever held.
            let pairs: Vec<(K, V)> = {
                let guard = self.pool.fetch_page(old_id)?;
                let page = guard.read_data();
                let block = BlockPage::<_, K, V>::new(page.data());
                let mut pairs = Vec::new();
                for slot in 0..Self::block_array_size() {
                    if block.is_readable(slot) {
                        pairs.push((block.key_at(slot)?, block.value_at(slot)?));
                    }
                }
                pairs
            };

            for (key, value) in &pairs {
                match self.insert_inner(key, value)? {
                    InsertOutcome::Inserted => {}
                    _ => {
                        return Err(DbError::Storage(format!(
                            "failed to migrate pair from block page {old_id}"
                        )))
                    }
                }
            }
            self.pool.delete_page(old_id)?;
        }
        Ok(())
    }

    /// Append fresh zeroed block pages until `num_buckets` slots are
    /// covered. Each page is unpinned dirty and flushed right away.
    fn append_blocks(
        &self,
        header: &mut HeaderPage<&mut [u8]>,
        num_buckets: u64,
    ) -> Result<()> {
        let n = Self::block_array_size() as u64;
        let mut covered = header.num_blocks() as u64 * n;
        while covered < num_buckets {
            let guard = self.pool.new_page()?;
            let block_id = guard.page_id();
            header.add_block_page_id(block_id)?;
            drop(guard);
            self.pool.flush_page(block_id)?;
            covered += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PAGE_SIZE;
    use crate::index::key::{OrdComparator, SipKeyHasher};
    use crate::storage::disk::DiskManager;
    use tempfile::tempdir;

    type IntTable = LinearProbeHashTable<u64, u64, OrdComparator, SipKeyHasher>;

    fn setup(pool_size: usize) -> (Arc<BufferPoolManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::new(dir.path(), PAGE_SIZE).unwrap();
        (
            Arc::new(BufferPoolManager::new(pool_size, Arc::new(disk))),
            dir,
        )
    }

    #[test]
    fn insert_get_remove_cycle() {
        let (pool, _dir) = setup(16);
        let table = IntTable::new("t", pool, OrdComparator, 100, SipKeyHasher).unwrap();

        assert!(table.insert(&1, &10).unwrap());
        assert!(table.insert(&2, &20).unwrap());
        assert_eq!(table.get_value(&1).unwrap(), vec![10]);
        assert_eq!(table.get_value(&2).unwrap(), vec![20]);

        assert!(table.remove(&1, &10).unwrap());
        assert!(table.get_value(&1).unwrap().is_empty());
        assert!(!table.remove(&1, &10).unwrap());
    }

    #[test]
    fn one_block_covers_small_tables() {
        let (pool, _dir) = setup(16);
        let table = IntTable::new("t", pool, OrdComparator, 100, SipKeyHasher).unwrap();
        assert_eq!(table.num_blocks().unwrap(), 1);
        assert_eq!(table.size().unwrap(), 100);
    }

    #[test]
    fn slot_index_is_stable_and_bounded() {
        let (pool, _dir) = setup(16);
        let table = IntTable::new("t", pool, OrdComparator, 50, SipKeyHasher).unwrap();

        let a = table.slot_index(&99).unwrap();
        let b = table.slot_index(&99).unwrap();
        assert_eq!(a, b);
        assert!(a < 50);
    }
}
