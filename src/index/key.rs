// Key and value plumbing for the hash index: a fixed-width byte codec
// plus the comparator and hasher capabilities supplied at construction.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Plain-old-data type with a fixed on-page width.
///
/// Keys and values are encoded little-endian into block-page slots; no
/// pointers, no hidden allocations. `decode` must accept exactly the
/// bytes `encode` produced.
pub trait FixedWidth: Copy + Send + Sync + 'static {
    const WIDTH: usize;

    fn encode(&self, buf: &mut [u8]);

    fn decode(buf: &[u8]) -> Self;
}

macro_rules! fixed_width_int {
    ($($t:ty),*) => {
        $(
            impl FixedWidth for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                #[inline]
                fn encode(&self, buf: &mut [u8]) {
                    buf[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(buf: &[u8]) -> Self {
                    let mut raw = [0u8; Self::WIDTH];
                    raw.copy_from_slice(&buf[..Self::WIDTH]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

fixed_width_int!(u32, i32, u64, i64);

impl<const N: usize> FixedWidth for [u8; N] {
    const WIDTH: usize = N;

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(self);
    }

    #[inline]
    fn decode(buf: &[u8]) -> Self {
        let mut raw = [0u8; N];
        raw.copy_from_slice(&buf[..N]);
        raw
    }
}

/// Total-order comparator over keys, supplied at index construction.
pub trait KeyComparator<K>: Clone + Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Comparator delegating to the key's `Ord`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Hash function over keys, supplied at index construction.
pub trait KeyHasher<K>: Clone + Send + Sync {
    fn hash_key(&self, key: &K) -> u64;
}

/// Default hasher backed by the standard library's SipHash.
#[derive(Clone, Copy, Debug, Default)]
pub struct SipKeyHasher;

impl<K: Hash> KeyHasher<K> for SipKeyHasher {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}
