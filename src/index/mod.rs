//! # Hash Index
//!
//! Disk-backed linear-probing hash index. The header page names the block
//! pages and records the table's slot count; block pages hold the
//! (key, value) slots plus their occupied/readable bitmaps. Keys and
//! values are fixed-width POD encoded straight into page bytes.

pub mod block_page;
pub mod header_page;
pub mod key;
pub mod linear_probe;

pub use block_page::{block_array_size, BlockPage};
pub use header_page::{HeaderPage, MAX_BLOCK_IDS};
pub use key::{FixedWidth, KeyComparator, KeyHasher, OrdComparator, SipKeyHasher};
pub use linear_probe::LinearProbeHashTable;
