//! Top-level handle: opens a database file plus optional WAL sidecar, reads
//! its schema once, and serves rows through the checkpoint-aware resolver.

use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::btree::table as btree_table;
use crate::dbheader::{self, DbHeader, TextEncoding};
use crate::error::Error;
use crate::page::{FileImage, RandomReader};
use crate::resolver::Resolver;
use crate::row::{self, Row};
use crate::schema::{self, TableDescriptor};
use crate::wal::Wal;

/// Caller-tunable knobs, named and defaulted to match the forensic reader's
/// external interface: which WAL overlay depth to read through, whether to
/// pay for checksum verification, and whether to bypass the header's
/// declared text encoding.
#[derive(Debug, Clone)]
pub struct Options {
    /// Selects the WAL overlay depth. 0 = newest committed state, equal to
    /// the checkpoint count = no overlay (pure base file).
    pub checkpoint: usize,
    /// If true, every consumed WAL frame is checksum-verified; failures
    /// surface as errors instead of being read past.
    pub verify_checksums: bool,
    /// Overrides the header-declared text encoding ("utf-8", "utf-16le",
    /// "utf-16be").
    pub encoding_override: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options { checkpoint: 0, verify_checksums: false, encoding_override: None }
    }
}

/// An open SQLite database, optionally overlaid with a WAL, with its schema
/// already parsed.
pub struct Database<RD: RandomReader, RW: RandomReader> {
    resolver: Resolver<RD, RW>,
    header: DbHeader,
    encoding: TextEncoding,
    tables: Vec<TableDescriptor>,
}

impl<RD: RandomReader, RW: RandomReader> Database<RD, RW> {
    /// Opens a database from already-open, random-access byte sources. The
    /// caller owns `db_reader`/`wal_reader` and is responsible for closing
    /// them; this handle never does so itself.
    pub fn open(db_reader: RD, wal_reader: Option<RW>, options: Options) -> Result<Self, Error> {
        let mut db_reader = db_reader;
        let header = dbheader::read_header(&mut db_reader)?;
        let file = FileImage::new(db_reader, header.page_size, header.reserved_space)?;

        let wal = wal_reader.map(Wal::open).transpose()?;
        let resolver = Resolver::new(file, wal, options.checkpoint, options.verify_checksums)?;

        let encoding = match &options.encoding_override {
            Some(s) => TextEncoding::from_str(s)?,
            None => header.encoding,
        };

        let tables = schema::read_tables(&resolver)?;
        log::debug!("loaded schema: {} table(s)", tables.len());

        Ok(Database { resolver, header, encoding, tables })
    }

    pub fn header(&self) -> &DbHeader {
        &self.header
    }

    pub fn checkpoint_count(&self) -> usize {
        self.resolver.checkpoint_count()
    }

    /// Every table recorded in `sqlite_schema`, each bound to this handle so
    /// its rows can be read.
    pub fn tables(&self) -> impl Iterator<Item = Table<'_, RD, RW>> {
        self.tables.iter().map(move |descriptor| Table { descriptor, database: self })
    }

    /// Looks up one table by name.
    pub fn table(&self, name: &str) -> Result<Table<'_, RD, RW>, Error> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|descriptor| Table { descriptor, database: self })
            .ok_or_else(|| Error::NoSuchTable(name.to_string()))
    }

    fn rows_of(&self, descriptor: &TableDescriptor) -> impl Iterator<Item = Result<Row, Error>> + '_ {
        let descriptor = descriptor.clone();
        let encoding = self.encoding;
        btree_table::Iterator::new(descriptor.root_page, &self.resolver).map(move |cell| {
            let (rowid, payload) = cell.map_err(crate::pagesource::Error::from)?;
            Ok(row::materialize(&descriptor, rowid, &payload, encoding)?)
        })
    }
}

/// One table bound to the `Database` it was looked up from: a thin handle
/// over a `TableDescriptor` that knows how to read its own rows.
pub struct Table<'db, RD: RandomReader, RW: RandomReader> {
    descriptor: &'db TableDescriptor,
    database: &'db Database<RD, RW>,
}

impl<'db, RD: RandomReader, RW: RandomReader> Table<'db, RD, RW> {
    pub fn descriptor(&self) -> &TableDescriptor {
        self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Iterates every row in rowid order, materialized to typed `SqlValue`s
    /// per the table's declared column affinities. Restartable: each call
    /// re-walks the btree from its root.
    pub fn rows(&self) -> impl Iterator<Item = Result<Row, Error>> + 'db {
        self.database.rows_of(self.descriptor)
    }

    /// The row at position `i` (0-based) in rowid-sorted iteration order.
    pub fn row(&self, i: usize) -> Result<Row, Error> {
        match self.rows().nth(i) {
            Some(r) => r,
            None => Err(Error::RowIndexOutOfRange { table: self.name().to_string(), index: i }),
        }
    }

    /// Number of rows in the table, found by a full scan.
    pub fn len(&self) -> Result<usize, Error> {
        self.rows().try_fold(0usize, |n, r| r.map(|_| n + 1))
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

impl Database<File, File> {
    /// Opens a database from a path, and optionally a WAL sidecar from a
    /// second path. The returned handle owns both file handles.
    pub fn open_path(db_path: &Path, wal_path: Option<&Path>, options: Options) -> Result<Self, Error> {
        let db_file = File::open(db_path)?;
        let wal_file = wal_path.map(File::open).transpose()?;
        Database::open(db_file, wal_file, options)
    }
}
