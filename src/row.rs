//! Turns a raw `(rowid, payload)` cell from a table btree into a row of
//! typed SQL values, one per declared column.

use crate::dbheader::TextEncoding;
use crate::record::ValueIterator;
use crate::schema::TableDescriptor;
use crate::serial_type;
use crate::sql_type::SqlType;
use crate::sql_value::SqlValue;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    SerialType(#[from] serial_type::Error),
    #[error("record has {found} values but table '{table}' declares {expected} columns")]
    ColumnCountMismatch { table: String, expected: usize, found: usize },
    #[error("text column was not valid {0:?}: {1}")]
    InvalidText(TextEncoding, std::string::FromUtf8Error),
}

fn decode_value(
    serial_type: i64,
    data: &[u8],
    affinity: Option<SqlType>,
    encoding: TextEncoding,
) -> Result<SqlValue, Error> {
    let is_text = serial_type >= 13 && serial_type % 2 == 1;
    if is_text && encoding != TextEncoding::Utf8 {
        let text = crate::dbheader::decode_text(data, encoding).map_err(|e| Error::InvalidText(encoding, e))?;
        return Ok(SqlValue::Text(text));
    }
    match affinity {
        Some(a) => Ok(serial_type::value_to_sql_typed_value(&serial_type, a, data)?),
        None => Ok(serial_type::to_sql_value(&serial_type, data)?),
    }
}


/// A single materialized row: one named `SqlValue` per column of its table,
/// in declaration order. Supports lookup by column name (`row["col"]`) and
/// iteration as `(name, value)` pairs, per the table's declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rowid: i64,
    names: std::rc::Rc<Vec<String>>,
    pub values: Vec<SqlValue>,
}

impl Row {
    /// The value of column `name`, or `None` if the table has no such column.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.names.iter().position(|n| n == name).map(|i| &self.values[i])
    }

    /// Iterates `(column name, value)` pairs in declared column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl std::ops::Index<&str> for Row {
    type Output = SqlValue;

    fn index(&self, name: &str) -> &SqlValue {
        self.get(name).unwrap_or_else(|| panic!("no column named '{}'", name))
    }
}

/// Builds a `Row` from a cell's raw `(rowid, payload)`, casting each stored
/// value to its column's declared affinity and substituting `rowid` for the
/// table's `INTEGER PRIMARY KEY` alias column, whose record slot is always
/// stored as `NULL`.
pub fn materialize(
    table: &TableDescriptor,
    rowid: i64,
    payload: &[u8],
    encoding: TextEncoding,
) -> Result<Row, Error> {
    let rowid_alias = table.rowid_alias_column();
    let mut values = Vec::with_capacity(table.columns.len());
    let names = std::rc::Rc::new(table.columns.iter().map(|c| c.name.clone()).collect());

    let mut record_values = ValueIterator::new(payload);
    for (i, col) in table.columns.iter().enumerate() {
        if Some(i) == rowid_alias {
            // The record slot for a rowid-alias column is always NULL; the
            // real value lives in the cell's own rowid.
            let _ = record_values.next();
            values.push(SqlValue::Int(rowid));
            continue;
        }
        let (serial_type, data) = record_values.next().ok_or_else(|| Error::ColumnCountMismatch {
            table: table.name.clone(),
            expected: table.columns.len(),
            found: i,
        })?;
        values.push(decode_value(serial_type, data, col.affinity, encoding)?);
    }

    Ok(Row { rowid, names, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescriptor;
    use crate::sql_type::SqlType;

    fn descriptor(columns: Vec<ColumnDescriptor>) -> TableDescriptor {
        TableDescriptor {
            name: "t".to_string(),
            root_page: 2,
            sql: String::new(),
            strict: false,
            columns,
        }
    }

    #[test]
    fn substitutes_rowid_for_integer_primary_key_alias() {
        let table = descriptor(vec![
            ColumnDescriptor {
                name: "id".into(),
                affinity: Some(SqlType::Int),
                declared_type: "INTEGER".into(),
                is_primary_key: true,
            },
            ColumnDescriptor {
                name: "name".into(),
                affinity: Some(SqlType::Text),
                declared_type: "TEXT".into(),
                is_primary_key: false,
            },
        ]);
        // record: [NULL, "hi"]
        let mut header = vec![0i64, 0]; // placeholders, filled below
        header[0] = 0; // NULL serial type
        let name_st = 13 + 2 * 2; // "hi" is 2 bytes
        header[1] = name_st;
        let header_body: Vec<u8> = header.iter().flat_map(|v| crate::varint::encode(*v)).collect();
        let header_len = crate::varint::encode((header_body.len() + 1) as i64);
        let mut record = header_len;
        record.extend_from_slice(&header_body);
        record.extend_from_slice(b"hi");

        let row = materialize(&table, 42, &record, TextEncoding::Utf8).unwrap();
        assert_eq!(row.values[0], SqlValue::Int(42));
        assert_eq!(row.values[1], SqlValue::Text("hi".to_string()));
        assert_eq!(row.get("id"), Some(&SqlValue::Int(42)));
        assert_eq!(row["name"], SqlValue::Text("hi".to_string()));
        assert_eq!(
            row.iter().collect::<Vec<_>>(),
            vec![("id", &SqlValue::Int(42)), ("name", &SqlValue::Text("hi".to_string()))]
        );
    }
}
