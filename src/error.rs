//! Crate-level error type, composed from each module's own error via
//! `#[from]`.

use crate::{dbheader, ddl, pagesource, resolver, row, schema, wal};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Header(#[from] dbheader::Error),
    #[error(transparent)]
    Wal(#[from] wal::Error),
    #[error(transparent)]
    Resolver(#[from] resolver::Error),
    #[error(transparent)]
    PageSource(#[from] pagesource::Error),
    #[error(transparent)]
    BtreeTable(#[from] crate::btree::table::Error),
    #[error(transparent)]
    Schema(#[from] schema::Error),
    #[error(transparent)]
    Ddl(#[from] ddl::Error),
    #[error(transparent)]
    Row(#[from] row::Error),
    #[error("no table named '{0}'")]
    NoSuchTable(String),
    #[error("row index {index} is out of range for table '{table}'")]
    RowIndexOutOfRange { table: String, index: usize },
    #[error("Error reading file: {0}")]
    Io(#[from] std::io::Error),
}
