use crate::common::PageId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer error: {0}")]
    Buffer(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Page {0} is still pinned")]
    PagePinned(PageId),

    #[error("Header block list is full ({0} entries)")]
    HeaderFull(usize),

    #[error("Slot {0} is not readable")]
    SlotNotReadable(usize),
}

pub type Result<T> = std::result::Result<T, DbError>;
