//! A read-only forensic reader for the SQLite database file format and its
//! Write-Ahead Log sidecar: walks table B-trees, reassembles overflow
//! payloads, and — when a WAL is attached — overlays any still-recoverable
//! historical checkpoint on top of the base file.
//!
//! No write path, no query engine, no index traversal: rows come back by
//! full table scan, exactly as the on-disk B-tree orders them.

pub mod ast;
pub mod btree;
pub mod database;
pub mod dbheader;
pub mod ddl;
pub mod error;
pub mod page;
pub mod pagesource;
pub mod record;
pub mod resolver;
pub mod row;
pub mod schema;
pub mod serial_type;
pub mod sql_type;
pub mod sql_value;
pub mod varint;
pub mod wal;

pub use database::{Database, Options, Table};
pub use dbheader::{DbHeader, TextEncoding};
pub use error::Error;
pub use row::Row;
pub use schema::{ColumnDescriptor, TableDescriptor};
pub use sql_type::SqlType;
pub use sql_value::SqlValue;

/// Decodes one record body (the payload of a single cell, minus the
/// rowid/length fields that wrap it) into its serial types and values,
/// independent of any table descriptor. This is the low-level codec the
/// B-tree walker and row materialiser both build on; exposed directly for
/// callers inspecting raw cell payloads (e.g. carved or partially-overwritten
/// pages where no schema is available).
pub fn read_record(bytes: &[u8], encoding: &str) -> Result<(Vec<i64>, Vec<SqlValue>), Error> {
    let encoding: TextEncoding = encoding.parse()?;
    let mut serial_types = Vec::new();
    let mut values = Vec::new();
    for (serial_type, data) in record::ValueIterator::new(bytes) {
        let is_text = serial_type >= 13 && serial_type % 2 == 1;
        let value = if is_text && encoding != TextEncoding::Utf8 {
            SqlValue::Text(
                dbheader::decode_text(data, encoding)
                    .map_err(|e| error::Error::Row(row::Error::InvalidText(encoding, e)))?,
            )
        } else {
            serial_type::to_sql_value(&serial_type, data)?
        };
        serial_types.push(serial_type);
        values.push(value);
    }
    Ok((serial_types, values))
}

/// Encodes a sequence of values into a record body, inverse of
/// [`read_record`] for the subset of types with a unique canonical encoding
/// (NULL, integers, floats, text, blob — not the literal-0/1 or
/// reduced-width integer serial types, which `read_record` only ever
/// produces on decode).
pub fn encode_record(values: &[SqlValue]) -> Vec<u8> {
    let mut header_body = Vec::new();
    let mut body = Vec::new();
    for value in values {
        let (serial_type, mut bytes) = match value {
            SqlValue::Null() => (0i64, Vec::new()),
            SqlValue::Int(n) => encode_int(*n),
            SqlValue::Real(f) => (7i64, f.to_be_bytes().to_vec()),
            SqlValue::Text(s) => (13 + 2 * s.len() as i64, s.clone().into_bytes()),
            SqlValue::Blob(b) => (12 + 2 * b.len() as i64, b.clone()),
        };
        header_body.extend_from_slice(&varint::encode(serial_type));
        body.append(&mut bytes);
    }
    let mut header_len = varint::encode(0);
    loop {
        let candidate_len = header_body.len() + header_len.len();
        let encoded = varint::encode(candidate_len as i64);
        if encoded.len() == header_len.len() {
            header_len = encoded;
            break;
        }
        header_len = encoded;
    }
    let mut record = header_len;
    record.extend_from_slice(&header_body);
    record.extend_from_slice(&body);
    record
}

fn encode_int(n: i64) -> (i64, Vec<u8>) {
    if (-128..=127).contains(&n) {
        (1, vec![n as i8 as u8])
    } else if (-32768..=32767).contains(&n) {
        (2, (n as i16).to_be_bytes().to_vec())
    } else if (-8_388_608..=8_388_607).contains(&n) {
        let b = (n as i32).to_be_bytes();
        (3, b[1..].to_vec())
    } else if (-2_147_483_648..=2_147_483_647).contains(&n) {
        (4, (n as i32).to_be_bytes().to_vec())
    } else if (-140_737_488_355_328..=140_737_488_355_327).contains(&n) {
        let b = n.to_be_bytes();
        (5, b[2..].to_vec())
    } else {
        (6, n.to_be_bytes().to_vec())
    }
}
