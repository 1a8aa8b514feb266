//! Iterates over the cells in a single btree page, without interpreting
//! what kind of cell they are. Used by `leaf` and `interior`.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

use super::PageType;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid btree page type byte: {0}")]
    InvalidPageType(u8),
    #[error("Error reading btree page: {0}")]
    Io(#[from] std::io::Error),
}

/// Iterator over cells within a page, without interpreting the cell contents.
///
/// Owns the page's bytes, so it can outlive the call that fetched them from
/// a `PageSource`.
pub struct Iterator {
    page: Vec<u8>,
    cell_idx: usize,
    cell_offsets: Vec<usize>,
    cell_lengths: Vec<usize>,
}

impl Iterator {
    /// Creates an iterator over the cells of a single page of a btree.
    ///
    /// `page` must be the full page, including the 100-byte file header on
    /// page 1 (`non_btree_header_bytes` skips past it).
    pub fn new(page: Vec<u8>, non_btree_header_bytes: usize, page_size: u32) -> Result<Iterator, Error> {
        let mut c = Cursor::new(&page);
        c.seek(SeekFrom::Start(non_btree_header_bytes as u64))?;
        let btree_page_type = match c.read_u8()? {
            0x02 => PageType::IndexInterior,
            0x05 => PageType::TableInterior,
            0x0a => PageType::IndexLeaf,
            0x0d => PageType::TableLeaf,
            b => return Err(Error::InvalidPageType(b)),
        };
        c.seek(SeekFrom::Start(3 + non_btree_header_bytes as u64))?;
        let num_cells: u32 = c.read_u16::<BigEndian>()? as u32;

        let btree_header_bytes = match btree_page_type {
            PageType::IndexInterior | PageType::TableInterior => 12,
            PageType::IndexLeaf | PageType::TableLeaf => 8,
        };
        c.seek(SeekFrom::Start(btree_header_bytes + non_btree_header_bytes as u64))?;

        let mut it = Iterator {
            page,
            cell_idx: 0,
            cell_offsets: Vec::new(),
            cell_lengths: Vec::new(),
        };

        // The cell pointer array of a b-tree page immediately follows the
        // b-tree page header: K 2-byte big-endian offsets into the cell
        // content area, in key order (smallest key first).
        let mut last_offset: usize = page_size as usize;
        for _ in 0..num_cells {
            let off = c.read_u16::<BigEndian>()? as usize;
            it.cell_offsets.push(off);
            it.cell_lengths.push(last_offset - off);
            last_offset = off;
        }
        Ok(it)
    }
}

impl core::iter::Iterator for Iterator {
    /// The bytes of one cell; format depends on the page's btree type.
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cell_idx >= self.cell_offsets.len() {
            return None;
        }
        let b = self.cell_offsets[self.cell_idx];
        let e = b + self.cell_lengths[self.cell_idx];
        self.cell_idx += 1;
        Some(self.page[b..e].to_vec())
    }
}

// Cell Formats from https://www.sqlite.org/fileformat2.html#b_tree_pages
//
// Table B-Tree Leaf Cell (header 0x0d):
// A varint which is the total number of bytes of payload, including any overflow
// A varint which is the integer key, a.k.a. "rowid"
// The initial portion of the payload that does not spill to overflow pages.
// A 4-byte big-endian integer page number for the first page of the overflow page list - omitted if all payload fits on the b-tree page.
//
// Table B-Tree Interior Cell (header 0x05):
// A 4-byte big-endian page number which is the left child pointer.
// A varint which is the integer key

#[cfg(test)]
const TEST_PAGE: &str = "0d00 0000 0a01 ce00 01fb 01f6 01f1 01ec
01e7 01e2 01dd 01d8 01d3 01ce 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 0000
0000 0000 0000 0000 0000 0000 0000 030a
020f 4a03 0902 0f49 0308 020f 4803 0702
0f47 0306 020f 4603 0502 0f45 0304 020f
4403 0302 0f43 0302 020f 4203 0102 0f41";
