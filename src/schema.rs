//! Reads the `sqlite_schema` table (always rooted at page 1) and parses the
//! `CREATE TABLE` statements it records into `TableDescriptor`s the rest of
//! the crate can use to find and interpret tables.

use crate::ast;
use crate::btree::table as btree_table;
use crate::ddl;
use crate::pagesource::PageSource;
use crate::record::{HeaderIterator, ValueIterator};
use crate::serial_type;
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

pub const SQLITE_SCHEMA_ROOT_PAGE: u64 = 1;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Table(#[from] btree_table::Error),
    #[error(transparent)]
    SerialType(#[from] serial_type::Error),
    #[error(transparent)]
    Ddl(#[from] ddl::Error),
    #[error("sqlite_schema row for '{0}' has fewer than 5 columns")]
    MalformedSchemaRow(String),
}

#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    /// `None` when the column has no declared type, which is legal SQL.
    pub affinity: Option<SqlType>,
    /// The type name exactly as declared in the `CREATE TABLE` statement
    /// (empty if none was given). Kept verbatim, separate from `affinity`,
    /// because rowid-alias detection depends on the exact spelling
    /// `INTEGER` rather than on any type that merely collapses to the same
    /// `Int` affinity (e.g. `INT`, which does not make a column a rowid
    /// alias in SQLite).
    pub declared_type: String,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub root_page: u64,
    pub sql: String,
    pub strict: bool,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Index of the column that aliases `rowid`, if this table declares a
    /// single-column `INTEGER PRIMARY KEY`. Such a column's stored value is
    /// always NULL in the row's own record; its real value is the cell's
    /// rowid.
    ///
    /// Per SQLite's own rule, this only applies when the column's type is
    /// declared exactly `INTEGER` (case-insensitive) — `INT PRIMARY KEY` or
    /// any other integer-affinity spelling declares an ordinary primary key
    /// whose value is stored like any other column, not a rowid alias.
    pub fn rowid_alias_column(&self) -> Option<usize> {
        let pk_cols: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key)
            .map(|(i, _)| i)
            .collect();
        if pk_cols.len() != 1 {
            return None;
        }
        let idx = pk_cols[0];
        if self.columns[idx].declared_type.eq_ignore_ascii_case("INTEGER") {
            Some(idx)
        } else {
            None
        }
    }

    /// Names of each column, in declared order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

fn decode_text(serial_type: i64, data: &[u8]) -> Result<String, Error> {
    match serial_type::to_sql_value(&serial_type, data)? {
        SqlValue::Text(s) => Ok(s),
        SqlValue::Null() => Ok(String::new()),
        _ => Ok(String::new()),
    }
}

/// Scans every row of `sqlite_schema` and returns the `table`-type entries,
/// each with its `CREATE TABLE` statement parsed into column descriptors.
pub fn read_tables(source: &dyn PageSource) -> Result<Vec<TableDescriptor>, Error> {
    let mut tables = Vec::new();
    for cell in btree_table::Iterator::new(SQLITE_SCHEMA_ROOT_PAGE, source) {
        let (_rowid, payload) = cell?;
        let mut values = ValueIterator::new(&payload);

        let (type_st, type_bytes) = values.next().ok_or_else(|| Error::MalformedSchemaRow(String::new()))?;
        let obj_type = decode_text(type_st, type_bytes)?;

        let (name_st, name_bytes) = values.next().ok_or_else(|| Error::MalformedSchemaRow(obj_type.clone()))?;
        let name = decode_text(name_st, name_bytes)?;

        let (_tbl_name_st, _tbl_name_bytes) = values.next().ok_or_else(|| Error::MalformedSchemaRow(name.clone()))?;

        let (rootpage_st, rootpage_bytes) = values.next().ok_or_else(|| Error::MalformedSchemaRow(name.clone()))?;
        let rootpage = match serial_type::to_sql_value(&rootpage_st, rootpage_bytes)? {
            SqlValue::Int(i) => i as u64,
            _ => continue,
        };

        let (sql_st, sql_bytes) = values.next().ok_or_else(|| Error::MalformedSchemaRow(name.clone()))?;
        let sql = decode_text(sql_st, sql_bytes)?;

        if obj_type != "table" || sql.is_empty() {
            continue;
        }
        // Internal schema-only objects (sqlite_sequence, etc.) have no
        // user-facing CREATE TABLE worth exposing through this reader, but
        // sqlite_sequence itself does, so we only special-case the ones
        // that never carry a CREATE TABLE body at all; none do here, so we
        // simply attempt the parse and skip anything that doesn't parse as
        // a CREATE TABLE body (e.g. a future, currently-unhandled DDL kind).
        let parsed = match ddl::parse_create_statement(&sql) {
            Ok(ast) => ast,
            Err(_) => continue,
        };
        tables.push(table_descriptor_from_ast(name, rootpage, sql, parsed));
    }
    Ok(tables)
}

fn table_descriptor_from_ast(name: String, root_page: u64, sql: String, ast: ast::CreateStatement) -> TableDescriptor {
    let columns = ast
        .coldefs
        .into_iter()
        .map(|c| ColumnDescriptor {
            name: c.colname.name,
            affinity: c.coltype.parse::<SqlType>().ok(),
            declared_type: c.coltype,
            is_primary_key: c.primary_key,
        })
        .collect();
    TableDescriptor { name, root_page, sql, strict: ast.strict, columns }
}

/// Helper used by `HeaderIterator`/`ValueIterator` callers who only need the
/// count of fields in a record without materializing the values.
pub fn field_count(payload: &[u8]) -> usize {
    HeaderIterator::new(payload).count()
}
