//! heapdb - inspect and edit a single heap table file

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use heapdb::access::schema::Schema;
use heapdb::access::tuple::{Tuple, TupleId};
use heapdb::access::value::{DataType, Value};
use heapdb::config::{Config, DEFAULT_LOCK_WAIT, DEFAULT_PAGE_SIZE, DEFAULT_POOL_PAGES};
use heapdb::database::Database;
use heapdb::storage::error::StorageResult;
use heapdb::storage::page::heap_page::slots_per_page;
use heapdb::storage::page::PageId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// heapdb - transactional heap table storage
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Table file
    table: PathBuf,

    /// Row layout, e.g. "id:int,name:text"
    #[arg(short, long, value_parser = parse_schema)]
    schema: Schema,

    /// Bytes per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Pages kept in the buffer pool
    #[arg(long, default_value_t = DEFAULT_POOL_PAGES)]
    pool_pages: usize,

    /// Sleep between lock attempts, in milliseconds
    #[arg(long, default_value_t = DEFAULT_LOCK_WAIT.as_millis() as u64)]
    lock_wait_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert one row; values are given in column order
    Insert { values: Vec<String> },
    /// Delete the row stored at PAGE:SLOT
    Delete { page: u32, slot: u16 },
    /// Print every row with its location
    Scan,
    /// Print page and slot statistics
    Stats,
}

fn parse_schema(s: &str) -> Result<Schema, String> {
    s.parse()
}

fn parse_value(data_type: DataType, raw: &str) -> Result<Value> {
    match data_type {
        DataType::Int32 => Ok(Value::Int32(
            raw.parse()
                .with_context(|| format!("'{}' is not an int", raw))?,
        )),
        DataType::Text => Ok(Value::Text(raw.to_string())),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = Config::new()
        .with_page_size(args.page_size)
        .with_pool_pages(args.pool_pages)
        .with_lock_wait(Duration::from_millis(args.lock_wait_ms));
    let db = Database::new(config)?;
    let table_id = db.open_table(&args.table, args.schema, "main")?;
    let file = db.table("main")?;
    let schema = Arc::clone(file.schema());

    let txn = db.begin();
    match args.command {
        Command::Insert { values } => {
            if values.len() != schema.num_columns() {
                bail!(
                    "expected {} values for {}, got {}",
                    schema.num_columns(),
                    schema,
                    values.len()
                );
            }
            let values = schema
                .columns()
                .iter()
                .zip(&values)
                .map(|(column, raw)| parse_value(column.data_type, raw))
                .collect::<Result<Vec<_>>>()?;
            let mut tuple = Tuple::new(Arc::clone(&schema), values)?;
            txn.insert(table_id, &mut tuple)?;
            if let Some(id) = tuple.tuple_id() {
                println!("inserted at {}:{}", id.page_id.page_no, id.slot_id);
            }
        }
        Command::Delete { page, slot } => {
            let target = TupleId::new(PageId::new(table_id, page), slot);
            let tuple = txn
                .scan(&file)
                .find(|row| row.as_ref().map_or(true, |row| row.tuple_id() == Some(target)))
                .transpose()?
                .with_context(|| format!("no row at {}:{}", page, slot))?;
            txn.delete(&tuple)?;
            println!("deleted {}:{}", page, slot);
        }
        Command::Scan => {
            for row in txn.scan(&file) {
                let row = row?;
                if let Some(id) = row.tuple_id() {
                    println!("{}:{}\t{}", id.page_id.page_no, id.slot_id, row);
                }
            }
        }
        Command::Stats => {
            let rows = txn.scan(&file).collect::<StorageResult<Vec<_>>>()?.len();
            println!("table:          {}", file.path().display());
            println!("schema:         {}", schema);
            println!("row width:      {} bytes", schema.row_width());
            println!("pages:          {}", file.num_pages()?);
            println!(
                "slots per page: {}",
                slots_per_page(file.page_size(), schema.row_width())
            );
            println!("rows:           {}", rows);
            println!("cached pages:   {}", db.buffer_pool().cached_pages());
        }
    }
    txn.commit()?;

    Ok(())
}
