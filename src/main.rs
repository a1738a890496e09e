//! Meterscan
//!
//! Digitizes utility-meter readings from photographs: photos are normalized
//! for OCR, run through Tesseract, and the noisy text is distilled into a
//! best-guess numeric reading stored alongside date, time, meter name, and
//! the source image reference. Readings the pipeline is not confident about
//! are recorded with the "Cek Foto" marker for human review.

mod config;
mod ocr;
mod paths;
mod store;
mod worker;

use anyhow::{anyhow, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

use store::{RecordStore, RecordUpdate};

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("meterscan.log");
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(line.as_bytes());
    }
}

fn main() -> Result<()> {
    paths::ensure_directories()?;
    config::init_config();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return Ok(());
    }

    match args[0].as_str() {
        "list" => cmd_list(),
        "set" => cmd_set(&args[1..]),
        "delete" => cmd_delete(&args[1..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => cmd_process(&args),
    }
}

fn print_usage() {
    println!("meterscan - digitize utility-meter readings from photos");
    println!();
    println!("Usage:");
    println!("  meterscan <photo.jpg> [more photos...]   process photos and record readings");
    println!("  meterscan list                           show all recorded readings");
    println!("  meterscan set <id> name <value>          correct a record's meter name");
    println!("  meterscan set <id> reading <value>       correct a record's reading");
    println!("  meterscan delete <id> [more ids...]      delete records");
}

/// Processes one or more photos through the reading pipeline.
fn cmd_process(files: &[String]) -> Result<()> {
    // Trained data is fetched on demand; a failure here only matters once
    // the engine actually runs, so warn and continue like a missing install.
    if let Err(e) = ocr::ensure_tessdata() {
        log(&format!("Warning: failed to provision tessdata: {}", e));
    }

    let engine = ocr::OcrEngine::global()?;
    let config = config::get_config();
    let store = RecordStore::open(&paths::get_records_csv())?;

    let uploads_dir = paths::get_uploads_dir();
    let (sender, receiver) = worker::create_work_queue();
    std::thread::scope(|s| {
        s.spawn(|| worker::run_worker(receiver, engine, &store, config, &uploads_dir));
        for file in files {
            let item = worker::WorkItem::new(file.into());
            if sender.send(item).is_err() {
                break;
            }
        }
        drop(sender);
    });

    Ok(())
}

/// Prints all recorded readings, newest last.
fn cmd_list() -> Result<()> {
    let store = RecordStore::open(&paths::get_records_csv())?;
    let records = store.list_all()?;

    if records.is_empty() {
        println!("No readings recorded yet.");
        return Ok(());
    }

    println!("{:>4}  {:<10} {:<8} {:<20} {:<12} {}", "id", "date", "time", "meter", "reading", "image");
    for (id, record) in records {
        println!(
            "{:>4}  {:<10} {:<8} {:<20} {:<12} {}",
            id, record.date, record.time, record.meter_name, record.reading, record.image_ref
        );
    }
    Ok(())
}

/// Applies a human correction to one record field.
fn cmd_set(args: &[String]) -> Result<()> {
    let [id, field, value] = args else {
        return Err(anyhow!("Usage: meterscan set <id> <name|reading> <value>"));
    };
    let id = id.parse().map_err(|_| anyhow!("Invalid record id: {}", id))?;

    let update = match field.as_str() {
        "name" => RecordUpdate {
            meter_name: Some(value.clone()),
            ..RecordUpdate::default()
        },
        "reading" => RecordUpdate {
            reading: Some(value.clone()),
            ..RecordUpdate::default()
        },
        other => return Err(anyhow!("Unknown field '{}', expected name or reading", other)),
    };

    let store = RecordStore::open(&paths::get_records_csv())?;
    store.update_fields(id, &update)?;
    log(&format!("Updated record {}: {} = {}", id, field, value));
    Ok(())
}

/// Deletes records by id.
fn cmd_delete(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(anyhow!("Usage: meterscan delete <id> [more ids...]"));
    }
    let ids = args
        .iter()
        .map(|a| a.parse().map_err(|_| anyhow!("Invalid record id: {}", a)))
        .collect::<Result<Vec<_>>>()?;

    let store = RecordStore::open(&paths::get_records_csv())?;
    store.delete_many(&ids)?;
    log(&format!("Deleted {} record(s)", ids.len()));
    Ok(())
}
