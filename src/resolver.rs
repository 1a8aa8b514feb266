//! Blends a WAL's checkpointed history on top of the base database file, so
//! the rest of the crate can read "the database as of checkpoint N" through
//! one `PageSource` without knowing whether a page came from the file or
//! from a WAL frame.
//!
//! Checkpoints are addressed newest-first: checkpoint 0 is the most recent
//! committed state captured in the WAL, and `checkpoint_count()` addresses
//! the base file with no WAL overlay at all (pre-WAL state). Checkpoint `k`
//! means pages are resolved by searching checkpoints `k..` (newest first
//! among the active set) before falling back to the base file.

use crate::page::{FileImage, RandomReader};
use crate::pagesource::PageSource;
use crate::wal::{FrameGroup, Wal};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Wal(#[from] crate::wal::Error),
    #[error("checkpoint index {requested} is out of range; this WAL has {available} checkpoints")]
    CheckpointOutOfRange { requested: usize, available: usize },
}

pub struct Resolver<RD: RandomReader, RW: RandomReader> {
    file: FileImage<RD>,
    wal: Option<Wal<RW>>,
    /// Newest-first: `checkpoints[0]` is the most recently committed state.
    checkpoints: Vec<FrameGroup>,
    checkpoint: usize,
    verify_checksums: bool,
}

impl<RD: RandomReader, RW: RandomReader> Resolver<RD, RW> {
    pub fn new(
        file: FileImage<RD>,
        wal: Option<Wal<RW>>,
        checkpoint: usize,
        verify_checksums: bool,
    ) -> Result<Self, Error> {
        let mut checkpoints = match &wal {
            Some(w) => w.checkpoints()?,
            None => vec![],
        };
        checkpoints.reverse();
        if checkpoint > checkpoints.len() {
            return Err(Error::CheckpointOutOfRange { requested: checkpoint, available: checkpoints.len() });
        }
        Ok(Resolver { file, wal, checkpoints, checkpoint, verify_checksums })
    }

    /// Number of distinct checkpoints available in the WAL (0 if there is no WAL).
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    fn active_checkpoints(&self) -> &[FrameGroup] {
        &self.checkpoints[self.checkpoint..]
    }
}

impl<RD: RandomReader, RW: RandomReader> PageSource for Resolver<RD, RW> {
    fn page_size(&self) -> u32 {
        self.file.page_size()
    }

    fn reserved_space(&self) -> u8 {
        self.file.reserved_space()
    }

    fn read_page(&self, page_number: u64) -> Result<Vec<u8>, crate::pagesource::Error> {
        let page_u32 = page_number as u32;
        // The newest active checkpoint's commit sets the DB's page count as
        // of this overlay; pages beyond it don't exist for its duration,
        // even if an older checkpoint or the base file still has them.
        if let Some(newest) = self.active_checkpoints().first() {
            if let Some(size) = newest.db_size_pages {
                if page_u32 > size {
                    return Err(crate::pagesource::Error::OutOfRange(page_number));
                }
            }
        }
        for group in self.active_checkpoints() {
            if let Some(frame_idx) = group.frame_index_for_page(page_u32) {
                let wal = self.wal.as_ref().expect("checkpoints only exist when a WAL is present");
                if self.verify_checksums && !wal.frame_valid(frame_idx, true)? {
                    return Err(crate::pagesource::Error::ChecksumMismatch(page_u32));
                }
                let frame = wal.frame(frame_idx)?;
                return Ok(frame.data);
            }
        }
        Ok(self.file.read_page(page_number)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::ChecksumEndian;
    use std::io::Cursor;

    fn build_wal(page_size: u32, salt: (u32, u32), frames: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let endian = ChecksumEndian::Big;
        let mut header = vec![0u8; crate::wal::WAL_HEADER_BYTES];
        header[0..4].copy_from_slice(&0x377F_0683u32.to_be_bytes());
        header[4..8].copy_from_slice(&3007000u32.to_be_bytes());
        header[8..12].copy_from_slice(&page_size.to_be_bytes());
        header[16..20].copy_from_slice(&salt.0.to_be_bytes());
        header[20..24].copy_from_slice(&salt.1.to_be_bytes());

        let mut seed = crate::wal::calculate_checksum(&header[0..24], (0, 0), endian);
        let mut body = Vec::new();
        for &(page_number, page_count, data) in frames {
            let mut frame_hdr = vec![0u8; crate::wal::FRAME_HEADER_BYTES];
            frame_hdr[0..4].copy_from_slice(&page_number.to_be_bytes());
            frame_hdr[4..8].copy_from_slice(&page_count.to_be_bytes());
            frame_hdr[8..12].copy_from_slice(&salt.0.to_be_bytes());
            frame_hdr[12..16].copy_from_slice(&salt.1.to_be_bytes());
            seed = crate::wal::calculate_checksum(&frame_hdr[0..8], seed, endian);
            seed = crate::wal::calculate_checksum(data, seed, endian);
            frame_hdr[16..20].copy_from_slice(&seed.0.to_be_bytes());
            frame_hdr[20..24].copy_from_slice(&seed.1.to_be_bytes());
            body.extend_from_slice(&frame_hdr);
            body.extend_from_slice(data);
        }
        header[24..28].copy_from_slice(&seed.0.to_be_bytes());
        header[28..32].copy_from_slice(&seed.1.to_be_bytes());
        let mut out = header;
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn falls_back_to_base_file_with_no_wal() {
        let file = FileImage::new(Cursor::new(vec![7u8; 32]), 16, 0).unwrap();
        let resolver: Resolver<_, Cursor<Vec<u8>>> = Resolver::new(file, None, 0, false).unwrap();
        assert_eq!(resolver.checkpoint_count(), 0);
        assert_eq!(resolver.read_page(1).unwrap(), vec![7u8; 16]);
    }

    #[test]
    fn checkpoint_zero_returns_overlay_page() {
        let base = FileImage::new(Cursor::new(vec![1u8; 16]), 16, 0).unwrap();
        let overlay_page = vec![9u8; 16];
        let wal_bytes = build_wal(16, (1, 1), &[(1, 1, &overlay_page)]);
        let wal = Wal::open(Cursor::new(wal_bytes)).unwrap();
        let resolver = Resolver::new(base, Some(wal), 0, false).unwrap();
        assert_eq!(resolver.checkpoint_count(), 1);
        assert_eq!(resolver.read_page(1).unwrap(), overlay_page);
    }

    #[test]
    fn checkpoint_equal_to_len_ignores_wal() {
        let base_page = vec![1u8; 16];
        let base = FileImage::new(Cursor::new(base_page.clone()), 16, 0).unwrap();
        let overlay_page = vec![9u8; 16];
        let wal_bytes = build_wal(16, (1, 1), &[(1, 1, &overlay_page)]);
        let wal = Wal::open(Cursor::new(wal_bytes)).unwrap();
        let resolver = Resolver::new(base, Some(wal), 1, false).unwrap();
        assert_eq!(resolver.read_page(1).unwrap(), base_page);
    }

    #[test]
    fn commit_shortening_db_hides_pages_beyond_new_size() {
        let base_pages = vec![1u8; 32]; // 2 pages of 16 bytes each
        let base = FileImage::new(Cursor::new(base_pages), 16, 0).unwrap();
        let overlay_page = vec![9u8; 16];
        // page_count=1 means this commit shrinks the DB to 1 page.
        let wal_bytes = build_wal(16, (1, 1), &[(1, 1, &overlay_page)]);
        let wal = Wal::open(Cursor::new(wal_bytes)).unwrap();
        let resolver = Resolver::new(base, Some(wal), 0, false).unwrap();
        assert_eq!(resolver.read_page(1).unwrap(), overlay_page);
        assert!(matches!(resolver.read_page(2), Err(crate::pagesource::Error::OutOfRange(2))));
    }

    #[test]
    fn out_of_range_checkpoint_errs() {
        let base = FileImage::new(Cursor::new(vec![1u8; 16]), 16, 0).unwrap();
        let wal_bytes = build_wal(16, (1, 1), &[(1, 1, &vec![9u8; 16])]);
        let wal = Wal::open(Cursor::new(wal_bytes)).unwrap();
        assert!(matches!(
            Resolver::new(base, Some(wal), 5, false),
            Err(Error::CheckpointOutOfRange { requested: 5, available: 1 })
        ));
    }
}
