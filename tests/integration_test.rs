//! End-to-end tests driving the public `Database` API over hand-built,
//! in-memory database (and WAL) images, rather than binary fixture files.

use std::io::Cursor;

use sqlite_forensics::database::{Database, Options};
use sqlite_forensics::sql_value::SqlValue;

const SQLITE3_MAGIC: &[u8; 16] = b"SQLite format 3\0";

fn db_header(page_size: u16, num_pages: u32) -> Vec<u8> {
    let mut h = vec![0u8; 100];
    h[0..16].copy_from_slice(SQLITE3_MAGIC);
    h[16..18].copy_from_slice(&page_size.to_be_bytes());
    h[18] = 1;
    h[19] = 1;
    h[21] = 64;
    h[22] = 32;
    h[23] = 32;
    h[28..32].copy_from_slice(&num_pages.to_be_bytes());
    h[44..48].copy_from_slice(&4u32.to_be_bytes());
    h[56..60].copy_from_slice(&1u32.to_be_bytes()); // utf-8
    h
}

/// Builds one table-btree leaf page (page-size bytes), with `header_offset`
/// bytes of unrelated prefix skipped before the btree header (100 for page
/// 1, which carries the DB header first).
fn leaf_page(page_size: usize, header_offset: usize, cells: &[Vec<u8>]) -> Vec<u8> {
    let mut page = vec![0u8; page_size];
    page[header_offset] = 0x0d;
    let mut cursor_from_end = page_size;
    let mut offsets = Vec::new();
    for cell in cells {
        cursor_from_end -= cell.len();
        offsets.push(cursor_from_end);
        page[cursor_from_end..cursor_from_end + cell.len()].copy_from_slice(cell);
    }
    page[header_offset + 3..header_offset + 5].copy_from_slice(&(cells.len() as u16).to_be_bytes());
    page[header_offset + 5..header_offset + 7].copy_from_slice(&(cursor_from_end as u16).to_be_bytes());
    let mut cptr = header_offset + 8;
    for off in offsets {
        page[cptr..cptr + 2].copy_from_slice(&(off as u16).to_be_bytes());
        cptr += 2;
    }
    page
}

fn build_record(values: &[(i64, &[u8])]) -> Vec<u8> {
    let header_body: Vec<u8> = values.iter().flat_map(|(st, _)| sqlite_forensics::varint::encode(*st)).collect();
    let mut header_len_bytes = sqlite_forensics::varint::encode((header_body.len() + 1) as i64);
    loop {
        let total = header_len_bytes.len() + header_body.len();
        let candidate = sqlite_forensics::varint::encode(total as i64);
        if candidate.len() == header_len_bytes.len() {
            header_len_bytes = candidate;
            break;
        }
        header_len_bytes = candidate;
    }
    let mut record = header_len_bytes;
    record.extend_from_slice(&header_body);
    for (_, data) in values {
        record.extend_from_slice(data);
    }
    record
}

fn leaf_cell(rowid: i64, payload: &[u8]) -> Vec<u8> {
    let mut cell = sqlite_forensics::varint::encode(payload.len() as i64);
    cell.extend(sqlite_forensics::varint::encode(rowid));
    cell.extend_from_slice(payload);
    cell
}

fn text_value(s: &str) -> (i64, &[u8]) {
    ((13 + 2 * s.len()) as i64, s.as_bytes())
}

fn schema_row(rowid: i64, name: &str, root_page: i64, sql: &str) -> Vec<u8> {
    let record = build_record(&[
        text_value("table"),
        text_value(name),
        text_value(name),
        (1, &(root_page as i8).to_be_bytes()),
        text_value(sql),
    ]);
    leaf_cell(rowid, &record)
}

/// A single-table, single-page-schema, single-data-page database: page 1 is
/// `sqlite_schema` naming one table rooted at page 2; page 2 holds that
/// table's rows. Columns: `(id INTEGER PRIMARY KEY, name TEXT, value INT)`.
fn widgets_db(page_size: usize) -> Vec<u8> {
    let sql = "CREATE TABLE widgets (id integer primary key, name text, value int)";
    let schema_cell = schema_row(1, "widgets", 2, sql);
    let page1 = leaf_page(page_size, 100, &[schema_cell]);

    let rows: Vec<(i64, &str, i64)> = vec![(1, "foo", 10), (2, "bar", 20), (3, "baz", 30)];
    let cells: Vec<Vec<u8>> = rows
        .iter()
        .map(|(rowid, name, value)| {
            let record = build_record(&[(0, &[]), text_value(name), (1, &(*value as i8).to_be_bytes())]);
            leaf_cell(*rowid, &record)
        })
        .collect();
    let page2 = leaf_page(page_size, 0, &cells);

    let mut bytes = db_header(page_size as u16, 2);
    bytes.extend_from_slice(&page1[100..]);
    bytes.extend_from_slice(&page2);
    bytes
}

#[test]
fn reads_schema_and_rows_for_simple_table() {
    let page_size = 512usize;
    let bytes = widgets_db(page_size);
    let db: Database<Cursor<Vec<u8>>, Cursor<Vec<u8>>> = Database::open(Cursor::new(bytes), None, Options::default()).unwrap();

    assert_eq!(db.header().encoding.as_str(), "utf-8");

    let mut tables: Vec<_> = db.tables().collect();
    assert_eq!(tables.len(), 1);
    let table = tables.remove(0);
    assert_eq!(table.name(), "widgets");
    assert_eq!(table.descriptor().root_page, 2);
    assert_eq!(table.len().unwrap(), 3);
    assert!(!table.is_empty().unwrap());

    let rows: Vec<_> = table.rows().map(|r| r.unwrap()).collect();
    assert_eq!(rows[0].rowid, 1);
    assert_eq!(rows[0].get("id"), Some(&SqlValue::Int(1)));
    assert_eq!(rows[0]["name"], SqlValue::Text("foo".to_string()));
    assert_eq!(rows[0]["value"], SqlValue::Int(10));
    assert_eq!(rows[2]["name"], SqlValue::Text("baz".to_string()));

    // list(table.rows()) == [table.row(i) for i in range(len(table))]
    let by_index: Vec<_> = (0..table.len().unwrap()).map(|i| table.row(i).unwrap()).collect();
    assert_eq!(rows, by_index);

    assert!(db.table("nonexistent").is_err());
    let err = table.row(99).unwrap_err();
    assert!(matches!(err, sqlite_forensics::error::Error::RowIndexOutOfRange { .. }));
}

#[test]
fn opening_empty_database_yields_zero_tables() {
    let page_size = 512usize;
    let page1 = leaf_page(page_size, 100, &[]);
    let mut bytes = db_header(page_size as u16, 1);
    bytes.extend_from_slice(&page1[100..]);

    let db: Database<Cursor<Vec<u8>>, Cursor<Vec<u8>>> = Database::open(Cursor::new(bytes), None, Options::default()).unwrap();
    assert_eq!(db.tables().count(), 0);
    assert_eq!(db.header().encoding.as_str(), "utf-8");
}

#[test]
fn reassembles_a_row_whose_payload_spans_overflow_pages() {
    let page_size = 512usize;
    let sql = "CREATE TABLE blobby (id integer primary key, data text)";
    let schema_cell = schema_row(1, "blobby", 2, sql);
    let page1 = leaf_page(page_size, 100, &[schema_cell]);

    // A long text value guaranteed to exceed the leaf-table inline threshold
    // (U - 35 for a 512-byte page with no reserved space == 477 bytes).
    let long_text = "x".repeat(600);
    let record = build_record(&[(0, &[]), text_value(&long_text)]);

    let u = page_size as u64;
    let x = u - 35;
    let local_size = if record.len() as u64 <= x {
        record.len()
    } else {
        let m = ((u - 12) * 32 / 255) - 23;
        let k = m + (record.len() as u64 - m) % (u - 4);
        (if k <= x { k } else { m }) as usize
    };
    assert!(local_size < record.len(), "fixture must actually spill to overflow");

    let (local, overflow_bytes) = record.split_at(local_size);
    let mut cell = sqlite_forensics::varint::encode(record.len() as i64);
    cell.extend(sqlite_forensics::varint::encode(1));
    cell.extend_from_slice(local);
    cell.extend_from_slice(&3u32.to_be_bytes()); // first overflow page
    let page2 = leaf_page(page_size, 0, &[cell]);

    let mut overflow_page = vec![0u8; page_size];
    overflow_page[0..4].copy_from_slice(&0u32.to_be_bytes()); // terminal
    overflow_page[4..4 + overflow_bytes.len()].copy_from_slice(overflow_bytes);

    let mut bytes = db_header(page_size as u16, 3);
    bytes.extend_from_slice(&page1[100..]);
    bytes.extend_from_slice(&page2);
    bytes.extend_from_slice(&overflow_page);

    let db: Database<Cursor<Vec<u8>>, Cursor<Vec<u8>>> = Database::open(Cursor::new(bytes), None, Options::default()).unwrap();
    let table = db.table("blobby").unwrap();
    let row = table.row(0).unwrap();
    assert_eq!(row["data"], SqlValue::Text(long_text));
}

/// Builds a WAL with one frame per commit, salted as given, against page 2
/// of a database whose page size is `page_size`. Each commit's one frame
/// also terminates it (`page_count = db_pages`), matching `widgets_db`'s
/// fixed 2-page layout.
fn build_wal(page_size: u32, db_pages: u32, commits: &[(u32, &[u8])]) -> Vec<u8> {
    use sqlite_forensics::wal::{calculate_checksum, ChecksumEndian, FRAME_HEADER_BYTES, WAL_HEADER_BYTES};

    let endian = ChecksumEndian::Big;
    let mut header = vec![0u8; WAL_HEADER_BYTES];
    header[0..4].copy_from_slice(&0x377F_0683u32.to_be_bytes());
    header[4..8].copy_from_slice(&3007000u32.to_be_bytes());
    header[8..12].copy_from_slice(&page_size.to_be_bytes());
    // All frames here belong to the WAL's current generation, so they share
    // the header's salt (real WALs only vary a frame's salt from the
    // header's when that frame is stale/recycled tail data).
    let header_salt1 = commits.first().map(|&(s, _)| s).unwrap_or(0);
    header[16..20].copy_from_slice(&header_salt1.to_be_bytes());

    let mut seed = calculate_checksum(&header[0..24], (0, 0), endian);
    let mut body = Vec::new();
    for &(salt1, page_data) in commits {
        let mut frame_hdr = vec![0u8; FRAME_HEADER_BYTES];
        frame_hdr[0..4].copy_from_slice(&2u32.to_be_bytes()); // page number 2
        frame_hdr[4..8].copy_from_slice(&db_pages.to_be_bytes()); // commits
        frame_hdr[8..12].copy_from_slice(&salt1.to_be_bytes());
        seed = calculate_checksum(&frame_hdr[0..8], seed, endian);
        seed = calculate_checksum(page_data, seed, endian);
        frame_hdr[16..20].copy_from_slice(&seed.0.to_be_bytes());
        frame_hdr[20..24].copy_from_slice(&seed.1.to_be_bytes());
        body.extend_from_slice(&frame_hdr);
        body.extend_from_slice(page_data);
    }
    header[24..28].copy_from_slice(&seed.0.to_be_bytes());
    header[28..32].copy_from_slice(&seed.1.to_be_bytes());
    let mut out = header;
    out.extend_from_slice(&body);
    out
}

fn single_row_leaf_page(page_size: usize, rowid: i64, name: &str, value: i64) -> Vec<u8> {
    let record = build_record(&[(0, &[]), text_value(name), (1, &(value as i8).to_be_bytes())]);
    let cell = leaf_cell(rowid, &record);
    leaf_page(page_size, 0, &[cell])
}

#[test]
fn checkpoint_index_rewinds_through_wal_history() {
    let page_size = 512u32;
    let base = widgets_db(page_size as usize);

    let page2_v1 = single_row_leaf_page(page_size as usize, 1, "first", 1);
    let page2_v2 = single_row_leaf_page(page_size as usize, 1, "second", 2);
    let wal = build_wal(page_size, 2, &[(11, &page2_v1), (22, &page2_v2)]);

    let read_value = |checkpoint: usize| -> SqlValue {
        let options = Options { checkpoint, verify_checksums: false, encoding_override: None };
        let db: Database<Cursor<Vec<u8>>, Cursor<Vec<u8>>> =
            Database::open(Cursor::new(base.clone()), Some(Cursor::new(wal.clone())), options).unwrap();
        let table = db.table("widgets").unwrap();
        table.row(0).unwrap()["name"].clone()
    };

    assert_eq!(read_value(2), SqlValue::Text("foo".to_string())); // checkpoint == len: pure base file
    assert_eq!(read_value(1), SqlValue::Text("first".to_string())); // one checkpoint back
    assert_eq!(read_value(0), SqlValue::Text("second".to_string())); // newest
}

#[test]
fn verify_checksums_catches_a_corrupted_frame() {
    let page_size = 512u32;
    let base = widgets_db(page_size as usize);
    let page2_v1 = single_row_leaf_page(page_size as usize, 1, "first", 1);
    let mut wal = build_wal(page_size, 2, &[(11, &page2_v1)]);
    // Flip a byte inside the frame's page data without updating its checksum.
    let frame_data_start = sqlite_forensics::wal::WAL_HEADER_BYTES + sqlite_forensics::wal::FRAME_HEADER_BYTES;
    wal[frame_data_start] ^= 0xff;

    let options = Options { checkpoint: 0, verify_checksums: true, encoding_override: None };
    let db: Database<Cursor<Vec<u8>>, Cursor<Vec<u8>>> =
        Database::open(Cursor::new(base), Some(Cursor::new(wal)), options).unwrap();
    let table = db.table("widgets").unwrap();
    assert!(table.row(0).is_err());
}

#[test]
fn low_level_read_record_matches_s5_scenario() {
    let bytes = b"\x04\x00\x1b\x02testing\x059";
    let (types, values) = sqlite_forensics::read_record(bytes, "utf-8").unwrap();
    assert_eq!(types, vec![0, 27, 2]);
    assert_eq!(
        values,
        vec![SqlValue::Null(), SqlValue::Text("testing".to_string()), SqlValue::Int(1337)]
    );
}
