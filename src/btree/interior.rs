//! Iterates over the child pointers of a table btree's interior pages.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::cell;

pub type PageNum = u64;

/// Iterator over the child page pointers of a single interior page.
/// Produces every left child pointer, then finally the page's rightmost
/// pointer, in key order. Intended for full-scan traversal, not point lookups.
pub struct ScanIterator {
    ci: cell::Iterator,
    returned_rightmost: bool,
    rightmost_pointer: PageNum,
}

impl ScanIterator {
    pub fn new(ci: cell::Iterator, rmp: PageNum) -> ScanIterator {
        ScanIterator {
            ci,
            returned_rightmost: false,
            rightmost_pointer: rmp,
        }
    }
}

impl core::iter::Iterator for ScanIterator {
    type Item = PageNum;

    /// Returns the next child page number: left children first, in key
    /// order, then the rightmost pointer last.
    fn next(&mut self) -> Option<Self::Item> {
        if self.returned_rightmost {
            return None;
        }
        match self.ci.next() {
            None => {
                self.returned_rightmost = true;
                Some(self.rightmost_pointer)
            }
            Some(cell) => {
                // Table B-Tree Interior Cell (header 0x05):
                // A 4-byte big-endian page number which is the left child pointer.
                // A varint which is the integer key.
                let mut c = Cursor::new(&cell);
                let left_child_pagenum = c.read_u32::<BigEndian>().expect("cell too short for left child pointer");
                Some(left_child_pagenum as PageNum)
            }
        }
    }
}
