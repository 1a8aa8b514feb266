//! Assembles payloads that spill off the btree page they live on onto a
//! chain of overflow pages.
//!
//! A cell only stores the *initial portion* of its payload once the payload
//! is large enough; the remainder lives in a singly linked list of overflow
//! pages, each beginning with a 4-byte big-endian pointer to the next one
//! (0 terminates the chain) followed by raw payload bytes.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::pagesource::PageSource;

/// How many bytes of a leaf-table cell's payload are stored in the cell
/// itself before the rest spills to overflow pages, per the SQLite file
/// format's local-payload formula (section 1.5, "Overflow Pages").
///
/// * `usable_size` - page size minus reserved space (`U` in the format doc).
/// * `payload_len` - total payload length, local + overflow.
pub fn local_payload_size(usable_size: u32, payload_len: u64) -> u64 {
    let u = usable_size as u64;
    let x = u - 35;
    if payload_len <= x {
        return payload_len;
    }
    let m = ((u - 12) * 32 / 255) - 23;
    let k = m + (payload_len - m) % (u - 4);
    if k <= x {
        k
    } else {
        m
    }
}

/// Reads the full payload for a cell whose on-page bytes are `local`, given
/// the `declared_len` the cell claims the whole payload to be and the page
/// number of the first overflow page (if any).
pub fn assemble_payload(
    source: &dyn PageSource,
    local: &[u8],
    declared_len: u64,
    first_overflow_page: Option<u32>,
) -> Result<Vec<u8>, crate::pagesource::Error> {
    let mut payload = local.to_vec();
    let mut next_page = first_overflow_page;
    let usable_size = source.page_size() as u64 - source.reserved_space() as u64;
    while (payload.len() as u64) < declared_len {
        let pn = match next_page {
            Some(0) | None => {
                return Err(crate::pagesource::Error::OverflowTruncated {
                    declared: declared_len,
                    read: payload.len() as u64,
                })
            }
            Some(pn) => pn,
        };
        let page = source.read_page(pn as u64)?;
        let mut c = Cursor::new(&page[0..4]);
        let follow = c.read_u32::<BigEndian>().unwrap();
        let remaining = declared_len - payload.len() as u64;
        let take = std::cmp::min(remaining, usable_size - 4);
        payload.extend_from_slice(&page[4..4 + take as usize]);
        next_page = Some(follow);
    }
    Ok(payload)
}
