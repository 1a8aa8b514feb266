//! Parses the `CREATE TABLE` statements recorded in `sqlite_schema.sql`
//! columns into an AST describing each table's columns, primary key, and
//! `STRICT` flag.
//!
//! Grounded on the distilled grammar's separation of parse tree (pest's
//! generic token tree) from AST (this module's typed structs): the parse
//! tree is walked once, here, to build the type the rest of the crate
//! consumes.

use itertools::Itertools;
use pest::Parser;
use pest_derive::Parser as PestParser;

use crate::ast;

#[derive(PestParser)]
#[grammar = "ddl/grammar.pest"]
struct DdlParser;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to parse CREATE TABLE statement: {0}")]
    Parse(#[from] Box<pest::error::Error<Rule>>),
}

/// Parses one `CREATE TABLE` statement into an AST.
pub fn parse_create_statement(sql: &str) -> Result<ast::CreateStatement, Error> {
    let create_stmt = DdlParser::parse(Rule::create_stmt, sql)
        .map_err(Box::new)?
        .next()
        .expect("create_stmt rule always produces exactly one pair on success");

    let mut coldefs: Vec<ast::ColDef> = vec![];
    let mut databasename = String::from("main");
    let mut tablename = String::new();
    let mut strict = false;

    for part in create_stmt.into_inner() {
        match part.as_rule() {
            Rule::temp => databasename = String::from("temp"),
            Rule::if_not_exists => {}
            Rule::table_identifier_with_optional_db => {
                let idents = part.into_inner().collect_vec();
                match idents.len() {
                    1 => tablename = String::from(idents[0].as_str()),
                    2 => {
                        databasename = String::from(idents[0].as_str());
                        tablename = String::from(idents[1].as_str());
                    }
                    _ => unreachable!("grammar only permits 1 or 2 identifier parts"),
                }
            }
            Rule::column_defs => {
                let mut table_pk_column: Option<String> = None;
                for item in part.into_inner() {
                    match item.as_rule() {
                        Rule::column_def => {
                            let mut inner = item.into_inner();
                            let name = String::from(inner.next().expect("column_def always has a name").as_str());
                            let mut coltype = String::new();
                            let mut primary_key = false;
                            for rest in inner {
                                match rest.as_rule() {
                                    Rule::type_name => coltype = String::from(rest.as_str()),
                                    Rule::pk_kw => primary_key = true,
                                    Rule::not_null_kw => {}
                                    _ => {}
                                }
                            }
                            coldefs.push(ast::ColDef {
                                colname: ast::ColName { name },
                                coltype,
                                primary_key,
                            });
                        }
                        // A table-level `PRIMARY KEY (col)` constraint names
                        // its column separately from that column's own
                        // `column_def`; applied after every column is seen.
                        Rule::table_pk_constraint => {
                            let ident = item
                                .into_inner()
                                .find(|p| p.as_rule() == Rule::identifier)
                                .expect("table_pk_constraint always names one column");
                            table_pk_column = Some(String::from(ident.as_str()));
                        }
                        _ => {}
                    }
                }
                if let Some(pk_name) = table_pk_column {
                    for coldef in coldefs.iter_mut() {
                        if coldef.colname.name == pk_name {
                            coldef.primary_key = true;
                        }
                    }
                }
            }
            Rule::strict_kw => strict = true,
            Rule::EOI => {}
            _ => {}
        }
    }

    Ok(ast::CreateStatement { databasename, tablename, coldefs, strict })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_create_table() {
        let ast = parse_create_statement("CREATE TABLE t (a int, b text)").unwrap();
        assert_eq!(ast.tablename, "t");
        assert_eq!(ast.databasename, "main");
        assert!(!ast.strict);
        assert_eq!(ast.coldefs.len(), 2);
        assert_eq!(ast.coldefs[0].colname.name, "a");
        assert_eq!(ast.coldefs[0].coltype, "int");
        assert!(!ast.coldefs[0].primary_key);
    }

    #[test]
    fn parses_strict_and_primary_key() {
        let ast = parse_create_statement("CREATE TABLE t (id int primary key, name text) strict").unwrap();
        assert!(ast.strict);
        assert!(ast.coldefs[0].primary_key);
        assert!(!ast.coldefs[1].primary_key);
    }

    #[test]
    fn parses_temp_and_qualified_name() {
        let ast = parse_create_statement("CREATE TEMP TABLE main.t (a int)").unwrap();
        assert_eq!(ast.databasename, "main");
        assert_eq!(ast.tablename, "t");
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(parse_create_statement("not a create statement").is_err());
    }

    #[test]
    fn parses_table_level_primary_key_constraint() {
        let ast = parse_create_statement("CREATE TABLE t (a int, b int, PRIMARY KEY (a))").unwrap();
        assert_eq!(ast.coldefs.len(), 2);
        assert_eq!(ast.coldefs[0].colname.name, "a");
        assert!(ast.coldefs[0].primary_key);
        assert_eq!(ast.coldefs[1].colname.name, "b");
        assert!(!ast.coldefs[1].primary_key);
    }
}
