// Block page of the hash index.
//
// Layout:
//   array[N * slot_width] | occupied[ceil(N/8)] | readable[ceil(N/8)]
//
// `occupied` records slots that were ever written; `readable` records
// slots that are currently live. A slot with occupied = 1, readable = 0
// is a tombstone: removed, but probe chains still pass through it.

use crate::buffer::PAGE_SIZE;
use crate::error::{DbError, Result};
use crate::index::key::FixedWidth;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// Number of slots a block page holds for a given slot width.
///
/// Chosen so that `n * slot_width + 2 * ceil(n/8)` fits in one page.
pub const fn block_array_size(slot_width: usize) -> usize {
    (4 * PAGE_SIZE) / (4 * slot_width + 1)
}

/// Typed view over a block page's bytes.
///
/// Borrowed from a latched page buffer; the per-page latch brackets every
/// use. The readable bitmap is additionally accessed with byte-wide
/// atomics so that a claim racing at one slot has exactly one winner.
pub struct BlockPage<B, K, V> {
    data: B,
    _marker: PhantomData<(K, V)>,
}

impl<B, K, V> BlockPage<B, K, V>
where
    B: AsRef<[u8]>,
    K: FixedWidth,
    V: FixedWidth,
{
    pub fn new(data: B) -> Self {
        debug_assert!(data.as_ref().len() >= PAGE_SIZE);
        Self {
            data,
            _marker: PhantomData,
        }
    }

    pub const fn slot_width() -> usize {
        K::WIDTH + V::WIDTH
    }

    /// Slots per block page.
    pub const fn num_slots() -> usize {
        block_array_size(Self::slot_width())
    }

    const fn bitmap_len() -> usize {
        Self::num_slots().div_ceil(8)
    }

    const fn occupied_off() -> usize {
        Self::num_slots() * Self::slot_width()
    }

    const fn readable_off() -> usize {
        Self::occupied_off() + Self::bitmap_len()
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        debug_assert!(slot < Self::num_slots());
        let byte = self.data.as_ref()[Self::occupied_off() + slot / 8];
        (byte >> (slot % 8)) & 1 == 1
    }

    pub fn is_readable(&self, slot: usize) -> bool {
        debug_assert!(slot < Self::num_slots());
        let byte = &self.data.as_ref()[Self::readable_off() + slot / 8];
        // SAFETY: the byte lives inside the page buffer for the duration
        // of this view and u8/AtomicU8 share layout; only atomic ops ever
        // mutate readable bytes while the view is shared.
        let atomic = unsafe { AtomicU8::from_ptr(byte as *const u8 as *mut u8) };
        (atomic.load(Ordering::Acquire) >> (slot % 8)) & 1 == 1
    }

    /// Key stored at `slot`; the slot must be live.
    pub fn key_at(&self, slot: usize) -> Result<K> {
        if !self.is_readable(slot) {
            return Err(DbError::SlotNotReadable(slot));
        }
        let off = slot * Self::slot_width();
        Ok(K::decode(&self.data.as_ref()[off..off + K::WIDTH]))
    }

    /// Value stored at `slot`; the slot must be live.
    pub fn value_at(&self, slot: usize) -> Result<V> {
        if !self.is_readable(slot) {
            return Err(DbError::SlotNotReadable(slot));
        }
        let off = slot * Self::slot_width() + K::WIDTH;
        Ok(V::decode(&self.data.as_ref()[off..off + V::WIDTH]))
    }
}

impl<B, K, V> BlockPage<B, K, V>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    K: FixedWidth,
    V: FixedWidth,
{
    /// Claim `slot` and store `(key, value)` in it.
    ///
    /// The claim is a compare-and-set of the slot's readable bit: of two
    /// inserters racing at one slot, exactly one returns `true`. Returns
    /// `false` when the slot is already live or the CAS is lost.
    pub fn insert(&mut self, slot: usize, key: &K, value: &V) -> bool {
        debug_assert!(slot < Self::num_slots());
        let mask = 1u8 << (slot % 8);
        let byte_off = Self::readable_off() + slot / 8;

        let claimed = {
            let data = self.data.as_mut();
            // SAFETY: byte_off is in bounds; the atomic reference is
            // dropped before `data` is borrowed again below.
            let readable = unsafe { AtomicU8::from_ptr(data.as_mut_ptr().add(byte_off)) };
            let expected = readable.load(Ordering::Relaxed);
            let desired = expected | mask;
            expected != desired
                && readable
                    .compare_exchange(expected, desired, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
        };
        if !claimed {
            return false;
        }

        let data = self.data.as_mut();
        let off = slot * Self::slot_width();
        key.encode(&mut data[off..off + K::WIDTH]);
        value.encode(&mut data[off + K::WIDTH..off + K::WIDTH + V::WIDTH]);
        data[Self::occupied_off() + slot / 8] |= mask;
        true
    }

    /// Clear the readable bit of `slot`. The occupied bit stays set so
    /// probe chains keep forwarding through the tombstone.
    pub fn remove(&mut self, slot: usize) {
        debug_assert!(slot < Self::num_slots());
        let mask = 1u8 << (slot % 8);
        let byte_off = Self::readable_off() + slot / 8;

        let data = self.data.as_mut();
        // SAFETY: byte_off is in bounds; no other reference to the byte
        // is live while the atomic reference is used.
        let readable = unsafe { AtomicU8::from_ptr(data.as_mut_ptr().add(byte_off)) };
        let expected = readable.load(Ordering::Relaxed);
        let desired = expected & !mask;
        let _ = readable.compare_exchange(expected, desired, Ordering::Release, Ordering::Relaxed);
    }
}
