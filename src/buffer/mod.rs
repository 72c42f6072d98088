//! # Buffer Pool
//!
//! Fixed-size pool of page frames between the index and the disk manager.
//!
//! - [`frame`]: page-aligned buffers, frame metadata, RAII pin guards.
//!   Each frame's data lock is the per-page latch.
//! - [`replacer`]: clock (second-chance) victim selection.
//! - [`manager`]: the pool itself: page table, free list, eviction.
//!
//! Frames are pinned while a [`FrameGuard`] is alive and become eviction
//! candidates when the last guard drops. Dirty victims are written back
//! before their frame is reused.

pub mod frame;
pub mod manager;
pub mod replacer;

pub use frame::{BufferFrame, FrameGuard, PageBuffer, PAGE_SIZE};
pub use manager::{BufferPoolManager, BufferPoolStats};
pub use replacer::ClockReplacer;
