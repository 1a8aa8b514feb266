//! Iterates over the cells of a table btree's leaf pages, assembling any
//! payload that has spilled to overflow pages.

use super::cell;
use super::overflow;
use super::RowId;
use crate::pagesource::PageSource;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cell(#[from] cell::Error),
    #[error(transparent)]
    PageSource(#[from] crate::pagesource::Error),
}

pub struct Iterator<'s> {
    ci: cell::Iterator,
    source: &'s dyn PageSource,
}

impl<'s> Iterator<'s> {
    fn btree_start_offset(pgnum: u64) -> usize {
        match pgnum {
            1 => 100,
            _ => 0,
        }
    }

    /// Creates an iterator over the leaf cells of table-btree page `pgnum`.
    pub fn new(source: &'s dyn PageSource, pgnum: u64) -> Result<Iterator<'s>, Error> {
        let page = source.read_page(pgnum)?;
        let ci = cell::Iterator::new(page, Self::btree_start_offset(pgnum), source.page_size())?;
        Ok(Iterator { ci, source })
    }
}

impl<'s> core::iter::Iterator for Iterator<'s> {
    /// `(rowid, payload)`, with `payload` fully assembled even when it spans
    /// overflow pages.
    type Item = Result<(RowId, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let cell = self.ci.next()?;
        let (payload_len, bytesread) = crate::varint::decode(&cell);
        let mut offset = bytesread;
        let (rowid, bytesread2) = crate::varint::decode(&cell[offset..]);
        offset += bytesread2;

        let usable_size = self.source.page_size() - self.source.reserved_space() as u32;
        let local_size = overflow::local_payload_size(usable_size, payload_len as u64) as usize;

        let (local, first_overflow_page) = if local_size >= cell.len() - offset {
            (&cell[offset..], None)
        } else {
            let split = offset + local_size;
            let overflow_page = u32::from_be_bytes(cell[split..split + 4].try_into().unwrap());
            (&cell[offset..split], Some(overflow_page))
        };

        let payload = match overflow::assemble_payload(self.source, local, payload_len as u64, first_overflow_page) {
            Ok(p) => p,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok((rowid as RowId, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::FileImage;
    use std::io::Cursor;

    fn single_leaf_page_db(page_size: u32, rows: &[(i64, &[u8])]) -> Vec<u8> {
        let mut page = vec![0u8; page_size as usize];
        page[0] = 0x0d;
        let mut cell_bytes = Vec::new();
        let mut offsets = Vec::new();
        let mut cursor_from_end = page_size as usize;
        for (rowid, payload) in rows {
            let mut cell = crate::varint::encode(payload.len() as i64);
            cell.extend(crate::varint::encode(*rowid));
            cell.extend_from_slice(payload);
            cursor_from_end -= cell.len();
            offsets.push(cursor_from_end);
            page[cursor_from_end..cursor_from_end + cell.len()].copy_from_slice(&cell);
            cell_bytes.push(cell);
        }
        page[3..5].copy_from_slice(&(rows.len() as u16).to_be_bytes());
        page[5..7].copy_from_slice(&(cursor_from_end as u16).to_be_bytes());
        let mut cptr = 8usize;
        for off in offsets {
            page[cptr..cptr + 2].copy_from_slice(&(off as u16).to_be_bytes());
            cptr += 2;
        }
        page
    }

    #[test]
    fn iterates_rows_without_overflow() {
        let page_size = 512;
        let page = single_leaf_page_db(page_size, &[(1, b"hello"), (2, b"world")]);
        let page = [page.clone(), page].concat(); // pad to 2 pages so page 2 is addressable
        let img = FileImage::new(Cursor::new(page), page_size, 0).unwrap();
        let mut it = Iterator::new(&img, 2).unwrap();
        let (rowid, payload) = it.next().unwrap().unwrap();
        assert_eq!(rowid, 1);
        assert_eq!(payload, b"hello");
        let (rowid, payload) = it.next().unwrap().unwrap();
        assert_eq!(rowid, 2);
        assert_eq!(payload, b"world");
        assert!(it.next().is_none());
    }
}
