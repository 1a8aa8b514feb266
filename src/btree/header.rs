//! Reads the header of a btree page.
//! A b-tree page is divided into regions in the following order:
//! 1. The 100-byte database file header (found on page 1 only)
//! 2. The 8 or 12 byte b-tree page header
//! 3. The cell pointer array
//! 4. Unallocated space
//! 5. The cell content area
//! 6. The reserved region

use super::PageType;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid btree page type byte: {0}")]
    InvalidPageType(u8),
    #[error("Error reading btree page header: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Header {
    pub btree_page_type: PageType,
    pub freeblock_start: u32,
    pub num_cells: u32,
    pub cell_content_start: u32,
    pub rightmost_pointer: Option<u32>,
}

pub fn check_header(page: &[u8], non_btree_header_bytes: usize) -> Result<Header, Error> {
    let mut c = Cursor::new(page);
    // The first page has a header which is not btree content, but which is
    // included in cell pointer offsets.
    if non_btree_header_bytes > 0 {
        c.seek(SeekFrom::Current(non_btree_header_bytes as i64))?;
    }

    // Offset 0, 1 byte: the b-tree page type.
    let btree_page_type = match c.read_u8()? {
        0x02 => PageType::IndexInterior,
        0x05 => PageType::TableInterior,
        0x0a => PageType::IndexLeaf,
        0x0d => PageType::TableLeaf,
        b => return Err(Error::InvalidPageType(b)),
    };

    // Offset 1, 2 bytes: start of the first freeblock, or 0 if none.
    let freeblock_start: u32 = c.read_u16::<BigEndian>()? as u32;
    // Offset 3, 2 bytes: number of cells on the page.
    let num_cells: u32 = c.read_u16::<BigEndian>()? as u32;
    // Offset 5, 2 bytes: start of the cell content area. 0 means 65536.
    let cell_content_start: u32 = match c.read_u16::<BigEndian>()? {
        0 => 65536,
        x => x as u32,
    };
    // Offset 7, 1 byte: number of fragmented free bytes in the cell content area.
    let _fragmented_free_bytes = c.read_u8()?;
    // Offset 8, 4 bytes: rightmost child pointer, interior pages only.
    let rightmost_pointer = match btree_page_type {
        PageType::IndexInterior | PageType::TableInterior => Some(c.read_u32::<BigEndian>()?),
        PageType::IndexLeaf | PageType::TableLeaf => None,
    };

    Ok(Header {
        btree_page_type,
        freeblock_start,
        num_cells,
        cell_content_start,
        rightmost_pointer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_page_bytes(num_cells: u16) -> Vec<u8> {
        let mut p = vec![0u8; 512];
        p[0] = 0x0d;
        p[3..5].copy_from_slice(&num_cells.to_be_bytes());
        p[5..7].copy_from_slice(&0u16.to_be_bytes());
        p
    }

    #[test]
    fn parses_leaf_header() {
        let p = leaf_page_bytes(3);
        let hdr = check_header(&p, 0).unwrap();
        assert!(matches!(hdr.btree_page_type, PageType::TableLeaf));
        assert_eq!(hdr.num_cells, 3);
        assert_eq!(hdr.cell_content_start, 65536);
        assert!(hdr.rightmost_pointer.is_none());
    }

    #[test]
    fn parses_interior_rightmost_pointer() {
        let mut p = vec![0u8; 512];
        p[0] = 0x05;
        p[8..12].copy_from_slice(&42u32.to_be_bytes());
        let hdr = check_header(&p, 0).unwrap();
        assert_eq!(hdr.rightmost_pointer, Some(42));
    }

    #[test]
    fn rejects_bad_page_type() {
        let mut p = vec![0u8; 512];
        p[0] = 0xff;
        assert!(matches!(check_header(&p, 0), Err(Error::InvalidPageType(0xff))));
    }

    #[test]
    fn skips_database_header_on_page_one() {
        let mut p = vec![0u8; 612];
        p[100] = 0x0d;
        let hdr = check_header(&p, 100).unwrap();
        assert!(matches!(hdr.btree_page_type, PageType::TableLeaf));
    }
}
