// Thin CLI front-end: opens a database (and optionally its WAL sidecar) and
// dumps every table's rows to stdout. All the actual parsing lives in the
// library; this binary only wires up argv, logging, and formatting.

use std::path::PathBuf;
use std::process::ExitCode;

use sqlite_forensics::database::{Database, Options};

struct Args {
    db_path: PathBuf,
    wal_path: Option<PathBuf>,
    checkpoint: usize,
    verify_checksums: bool,
    encoding_override: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut checkpoint = 0usize;
    let mut verify_checksums = false;
    let mut encoding_override = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--checkpoint" => {
                let v = it.next().ok_or("--checkpoint needs a value")?;
                checkpoint = v.parse().map_err(|_| format!("not a number: {}", v))?;
            }
            "--verify-checksums" => verify_checksums = true,
            "--encoding" => {
                encoding_override = Some(it.next().ok_or("--encoding needs a value")?);
            }
            other => positional.push(other.to_string()),
        }
    }

    if positional.is_empty() {
        return Err("usage: sqlite-forensics <db-path> [wal-path] [--checkpoint N] [--verify-checksums] [--encoding utf-8|utf-16le|utf-16be]".to_string());
    }
    let db_path = PathBuf::from(&positional[0]);
    let wal_path = positional.get(1).map(PathBuf::from);

    Ok(Args { db_path, wal_path, checkpoint, verify_checksums, encoding_override })
}

fn print_table(table: &sqlite_forensics::Table<'_, std::fs::File, std::fs::File>) {
    println!("Table {} (root page {})", table.name(), table.descriptor().root_page);
    let col_names: Vec<&str> = table.descriptor().columns.iter().map(|c| c.name.as_str()).collect();
    println!("{}", col_names.join(" | "));
    for row in table.rows() {
        match row {
            Ok(row) => {
                let values: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
                println!("{}", values.join(" | "));
            }
            Err(e) => eprintln!("error reading row: {}", e),
        }
    }
    println!();
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::FAILURE;
        }
    };

    let options = Options {
        checkpoint: args.checkpoint,
        verify_checksums: args.verify_checksums,
        encoding_override: args.encoding_override,
    };

    let db = match Database::open_path(&args.db_path, args.wal_path.as_deref(), options) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("failed to open {}: {}", args.db_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("opened {} ({} checkpoint(s) available)", args.db_path.display(), db.checkpoint_count());
    println!("{:?}", db.header());

    for table in db.tables() {
        print_table(&table);
    }

    ExitCode::SUCCESS
}
