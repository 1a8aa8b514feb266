//! Reads fixed-size pages out of a random-access byte source: a path-backed
//! file or an in-memory fixture, anything implementing `Read + Seek`.

use std::io::{Read, Seek, SeekFrom};

use crate::pagesource::PageSource;

/// Anything a database or WAL file can be read from: a path-backed `File`,
/// an in-memory `Cursor<Vec<u8>>`, or a caller-supplied already-open handle.
pub trait RandomReader: Read + Seek {}
impl<T: Read + Seek> RandomReader for T {}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Page number {0} is out of range for this file.")]
    OutOfRange(u64),
    #[error("Error reading file: {0}")]
    Io(#[from] std::io::Error),
}

/// A single open file's worth of fixed-size pages, read on demand.
///
/// Page numbers are 1-based, matching SQLite's own numbering.
pub struct FileImage<R: RandomReader> {
    reader: std::cell::RefCell<R>,
    page_size: u32,
    reserved_space: u8,
    file_len: u64,
}

impl<R: RandomReader> FileImage<R> {
    pub fn new(mut reader: R, page_size: u32, reserved_space: u8) -> Result<Self, Error> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(FileImage {
            reader: std::cell::RefCell::new(reader),
            page_size,
            reserved_space,
            file_len,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn num_pages(&self) -> u64 {
        self.file_len / self.page_size as u64
    }

    /// Reads page `pn` (1-based) in full, including any reserved tail bytes.
    pub fn read_page(&self, pn: u64) -> Result<Vec<u8>, Error> {
        if pn == 0 || pn > self.num_pages() {
            return Err(Error::OutOfRange(pn));
        }
        let mut buf = vec![0u8; self.page_size as usize];
        let mut r = self.reader.borrow_mut();
        r.seek(SeekFrom::Start((pn - 1) * self.page_size as u64))?;
        r.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: RandomReader> PageSource for FileImage<R> {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn reserved_space(&self) -> u8 {
        self.reserved_space
    }

    fn read_page(&self, page_number: u64) -> Result<Vec<u8>, crate::pagesource::Error> {
        Ok(FileImage::read_page(self, page_number)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_pages_in_order() {
        let mut data = vec![0u8; 3 * 16];
        data[0] = 1;
        data[16] = 2;
        data[32] = 3;
        let img = FileImage::new(Cursor::new(data), 16, 0).unwrap();
        assert_eq!(img.num_pages(), 3);
        assert_eq!(img.read_page(1).unwrap()[0], 1);
        assert_eq!(img.read_page(2).unwrap()[0], 2);
        assert_eq!(img.read_page(3).unwrap()[0], 3);
    }

    #[test]
    fn out_of_range_page_errs() {
        let img = FileImage::new(Cursor::new(vec![0u8; 16]), 16, 0).unwrap();
        assert!(matches!(img.read_page(0), Err(Error::OutOfRange(0))));
        assert!(matches!(img.read_page(2), Err(Error::OutOfRange(2))));
    }
}
