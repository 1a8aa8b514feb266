//! Abstract syntax tree for the one SQL statement this crate parses:
//! `CREATE TABLE`. Schema introspection is read-only, so no other statement
//! forms are represented here.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColName {
    pub name: String,
}

impl std::fmt::Display for ColName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColDef {
    pub colname: ColName,
    pub coltype: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStatement {
    pub databasename: String, // "temp" or "main"
    pub tablename: String,
    pub coldefs: Vec<ColDef>,
    pub strict: bool,
}
