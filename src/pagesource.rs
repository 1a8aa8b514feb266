//! Generalizes "somewhere pages come from" so the btree walker can read from
//! a plain database file or from a WAL-overlaid view without caring which.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Page(#[from] crate::page::Error),
    #[error(transparent)]
    Wal(#[from] crate::wal::Error),
    #[error("page number {0} is out of range")]
    OutOfRange(u64),
    #[error("WAL frame for page {0} failed checksum verification")]
    ChecksumMismatch(u32),
    #[error("overflow chain for a payload of {declared} bytes ended after only {read} bytes")]
    OverflowTruncated { declared: u64, read: u64 },
}

/// Anything that can hand back a whole page's bytes by page number: the base
/// database file (`page::FileImage`) or a WAL-aware `resolver::Resolver`
/// blending checkpointed frames on top of it.
pub trait PageSource {
    fn page_size(&self) -> u32;
    /// Bytes reserved at the end of each page, outside the btree's usable area.
    fn reserved_space(&self) -> u8;
    fn read_page(&self, page_number: u64) -> Result<Vec<u8>, Error>;
}
