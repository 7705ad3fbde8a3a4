use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heapstore::{
    record, AttrType, Attribute, CompOp, FileManager, Predicate, RecordFileManager, Rid, Value,
    DEFAULT_PAGE_SIZE,
};

/// Inspect and poke a heapstore record file using a fixed demo schema:
/// id int, name varchar(50), score real.
#[derive(Parser)]
#[command(name = "heapstore-cli", version)]
struct Cli {
    /// Directory holding the record files
    #[arg(long, default_value = "./heapstore-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new record file
    Create { file: String },
    /// Remove a record file
    Destroy { file: String },
    /// Insert one record and print its RID
    Insert {
        file: String,
        id: i32,
        /// Omit for NULL
        name: Option<String>,
        /// Omit for NULL
        score: Option<f32>,
    },
    /// Read the record at (page, slot)
    Read { file: String, page: u32, slot: u16 },
    /// Delete the record at (page, slot)
    Delete { file: String, page: u32, slot: u16 },
    /// Print every record, optionally filtered by a minimum id
    Scan {
        file: String,
        #[arg(long)]
        min_id: Option<i32>,
    },
    /// Show page count and I/O counters
    Stats { file: String },
}

fn demo_schema() -> Vec<Attribute> {
    vec![
        Attribute::new("id", AttrType::Int),
        Attribute::new("name", AttrType::VarChar(50)),
        Attribute::new("score", AttrType::Real),
    ]
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let file_manager = FileManager::new(&cli.data_dir, DEFAULT_PAGE_SIZE)?;
    let rfm = RecordFileManager::new(file_manager);
    let fields = demo_schema();

    match cli.command {
        Command::Create { file } => {
            rfm.create_file(&file)?;
            println!("created {file}");
        }
        Command::Destroy { file } => {
            rfm.destroy_file(&file)?;
            println!("destroyed {file}");
        }
        Command::Insert {
            file,
            id,
            name,
            score,
        } => {
            let data = record::encode(
                &fields,
                &[
                    Some(Value::Int(id)),
                    name.map(Value::VarChar),
                    score.map(Value::Real),
                ],
            )?;
            let mut open = rfm.open_file(&file)?;
            let rid = rfm.insert_record(&mut open, &fields, &data)?;
            rfm.close_file(open)?;
            println!("inserted at page {}, slot {}", rid.page_num, rid.slot_num);
        }
        Command::Read { file, page, slot } => {
            let mut open = rfm.open_file(&file)?;
            let data = rfm.read_record(&mut open, Rid::new(page, slot))?;
            rfm.close_file(open)?;
            println!("{}", record::print_record(&fields, &data)?);
        }
        Command::Delete { file, page, slot } => {
            let mut open = rfm.open_file(&file)?;
            rfm.delete_record(&mut open, Rid::new(page, slot))?;
            rfm.close_file(open)?;
            println!("deleted page {page}, slot {slot}");
        }
        Command::Scan { file, min_id } => {
            let mut open = rfm.open_file(&file)?;
            let predicate = min_id.map(|min| Predicate::new("id", CompOp::Ge, Value::Int(min)));
            let projection: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
            let mut scan = rfm.scan(&mut open, fields.clone(), predicate, projection);
            let mut rows = 0;
            while let Some((rid, data)) = scan.next_record()? {
                println!(
                    "({}, {}): {}",
                    rid.page_num,
                    rid.slot_num,
                    record::print_record(&fields, &data)?
                );
                rows += 1;
            }
            drop(scan);
            rfm.close_file(open)?;
            println!("{rows} row(s)");
        }
        Command::Stats { file } => {
            let open = rfm.open_file(&file)?;
            let (reads, writes, appends) = open.io_counters();
            println!("pages:   {}", open.num_pages());
            println!("reads:   {reads}");
            println!("writes:  {writes}");
            println!("appends: {appends}");
            rfm.close_file(open)?;
        }
    }
    Ok(())
}
