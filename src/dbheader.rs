//! Reads the 100-byte header of a SQLite database file.
//!
//! Only the fields load-bearing for reading rows are validated: magic,
//! page size, reserved-space size and text encoding. Fields that a real
//! SQLite build may set to values this crate has no need of (version
//! numbers, vacuum settings, application id, ...) are read but not
//! rejected, so that files produced by any SQLite version can be parsed.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("The magic bytes for this file are wrong; not a SQLite database.")]
    WrongMagic,
    #[error("The page size in the header is not a supported power of two.")]
    UnsupportedPagesize,
    #[error("The text encoding code in the header is not 1, 2 or 3.")]
    UnsupportedEncoding,
    #[error("Error reading file: {0}")]
    Io(#[from] std::io::Error),
}

/// Text encoding declared in the database header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
        }
    }
}

impl std::str::FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-16le" | "utf16le" => Ok(TextEncoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(TextEncoding::Utf16Be),
            _ => Err(Error::UnsupportedEncoding),
        }
    }
}

/// Decodes `bytes` as text in the given encoding. Used both for ordinary row
/// values and for an operator-supplied `encoding_override` that bypasses a
/// header's declared encoding.
pub fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String, std::string::FromUtf8Error> {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()),
        TextEncoding::Utf16Le => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            Ok(String::from_utf16_lossy(&units))
        }
        TextEncoding::Utf16Be => {
            let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
            Ok(String::from_utf16_lossy(&units))
        }
    }
}

pub const SQLITE_DB_HEADER_BYTES: usize = 100;
const SQLITE3_MAGIC_STRING: &[u8; 16] = b"SQLite format 3\0";

/// The parsed, load-bearing subset of the 100-byte database header.
#[derive(Debug, Clone)]
pub struct DbHeader {
    pub page_size: u32,
    pub reserved_space: u8,
    pub encoding: TextEncoding,
    pub change_counter: u32,
    pub num_pages: u32,
    pub schema_cookie: u32,
}

/// Parses the header from any seekable, readable source, leaving the cursor
/// at the start of the stream on success.
pub fn read_header<R: Read + Seek>(f: &mut R) -> Result<DbHeader, Error> {
    f.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 16];
    f.read_exact(&mut magic)?;
    if &magic != SQLITE3_MAGIC_STRING {
        return Err(Error::WrongMagic);
    }

    // Offset 16, 2 bytes: page size. A value of 1 means 65536.
    let page_size: u32 = match f.read_u16::<BigEndian>()? {
        1 => 65536,
        n if n.is_power_of_two() && (512..=32768).contains(&n) => n as u32,
        _ => return Err(Error::UnsupportedPagesize),
    };

    // Offset 18/19: file format write/read version. Not load-bearing for a
    // read-only parser; a rollback-journal or WAL-mode file reads the same.
    let _write_version = f.read_u8()?;
    let _read_version = f.read_u8()?;

    // Offset 20: reserved space per page, trailing each page's usable area.
    let reserved_space = f.read_u8()?;

    // Offset 21-23: payload fractions. Always 64/32/32 in every SQLite
    // release to date; not meaningful to validate further here.
    let _max_payload_fraction = f.read_u8()?;
    let _min_payload_fraction = f.read_u8()?;
    let _leaf_payload_fraction = f.read_u8()?;

    let change_counter = f.read_u32::<BigEndian>()?;
    let num_pages = f.read_u32::<BigEndian>()?;

    let _first_freelist_trunk = f.read_u32::<BigEndian>()?;
    let _num_freelist_pages = f.read_u32::<BigEndian>()?;
    let schema_cookie = f.read_u32::<BigEndian>()?;
    let _schema_format = f.read_u32::<BigEndian>()?;
    let _default_cache_size = f.read_u32::<BigEndian>()?;
    let _largest_root_page = f.read_u32::<BigEndian>()?;

    let encoding = match f.read_u32::<BigEndian>()? {
        1 => TextEncoding::Utf8,
        2 => TextEncoding::Utf16Le,
        3 => TextEncoding::Utf16Be,
        _ => return Err(Error::UnsupportedEncoding),
    };

    let _user_version = f.read_u32::<BigEndian>()?;
    let _incremental_vacuum = f.read_u32::<BigEndian>()?;
    let _application_id = f.read_u32::<BigEndian>()?;

    let mut _reserved_for_expansion = [0u8; 20];
    f.read_exact(&mut _reserved_for_expansion)?;

    let _version_valid_for = f.read_u32::<BigEndian>()?;
    let _sqlite_version_number = f.read_u32::<BigEndian>()?;

    f.seek(SeekFrom::Start(0))?;
    Ok(DbHeader {
        page_size,
        reserved_space,
        encoding,
        change_counter,
        num_pages,
        schema_cookie,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn minimal_header_bytes(page_size: u16, encoding: u32) -> Vec<u8> {
        let mut v = vec![0u8; SQLITE_DB_HEADER_BYTES];
        v[0..16].copy_from_slice(SQLITE3_MAGIC_STRING);
        v[16..18].copy_from_slice(&page_size.to_be_bytes());
        v[18] = 1;
        v[19] = 1;
        v[21] = 64;
        v[22] = 32;
        v[23] = 32;
        v[44..48].copy_from_slice(&4u32.to_be_bytes()); // schema format
        v[56..60].copy_from_slice(&encoding.to_be_bytes());
        v
    }

    #[test]
    fn parses_minimal_header() {
        let bytes = minimal_header_bytes(4096, 1);
        let mut c = Cursor::new(bytes);
        let hdr = read_header(&mut c).unwrap();
        assert_eq!(hdr.page_size, 4096);
        assert_eq!(hdr.encoding, TextEncoding::Utf8);
        assert_eq!(hdr.reserved_space, 0);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_header_bytes(4096, 1);
        bytes[0] = b'X';
        let mut c = Cursor::new(bytes);
        assert!(matches!(read_header(&mut c), Err(Error::WrongMagic)));
    }

    #[test]
    fn pagesize_one_means_65536() {
        let bytes = minimal_header_bytes(1, 1);
        let mut c = Cursor::new(bytes);
        let hdr = read_header(&mut c).unwrap();
        assert_eq!(hdr.page_size, 65536);
    }

    #[test]
    fn decodes_utf16_encodings() {
        for (code, expect) in [(2, TextEncoding::Utf16Le), (3, TextEncoding::Utf16Be)] {
            let bytes = minimal_header_bytes(512, code);
            let mut c = Cursor::new(bytes);
            let hdr = read_header(&mut c).unwrap();
            assert_eq!(hdr.encoding, expect);
        }
    }

    #[test]
    fn rejects_bad_pagesize() {
        let bytes = minimal_header_bytes(600, 1);
        let mut c = Cursor::new(bytes);
        assert!(matches!(read_header(&mut c), Err(Error::UnsupportedPagesize)));
    }
}
