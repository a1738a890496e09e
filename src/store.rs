//! CSV-backed record store for meter readings.
//!
//! Appends are done in append-only mode for crash safety; updates and
//! deletions rewrite the whole file, which is fine at this write volume.
//! All mutations are serialized through a mutex (single-writer discipline)
//! so back-to-back image processing cannot lose updates.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Identifier of a stored record. Assigned on append as one past the
/// highest id currently in the file, so an id freed by deleting the newest
/// record may be handed out again.
pub type RecordId = u64;

/// CSV header row.
const CSV_HEADER: &str = "id,date,time,meter_name,reading,image_ref";

/// One persisted meter reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterRecord {
    /// Capture date, "%d-%m-%Y".
    pub date: String,
    /// Capture time, "%H:%M:%S".
    pub time: String,
    /// Human-assigned meter name; starts as a placeholder.
    pub meter_name: String,
    /// Extracted reading, or the review sentinel. May be overwritten by
    /// manual correction.
    pub reading: String,
    /// File name of the stored source image. Must stay retrievable for as
    /// long as the record exists.
    pub image_ref: String,
}

impl MeterRecord {
    /// Creates a record stamped with the current local date and time.
    pub fn new(meter_name: &str, reading: &str, image_ref: &str) -> Self {
        let now = Local::now();
        Self {
            date: now.format("%d-%m-%Y").to_string(),
            time: now.format("%H:%M:%S").to_string(),
            meter_name: meter_name.to_string(),
            reading: reading.to_string(),
            image_ref: image_ref.to_string(),
        }
    }
}

/// Fields of a record a human reviewer may correct.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub meter_name: Option<String>,
    pub reading: Option<String>,
}

/// CSV-file record store.
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    /// Opens the store at the given path, writing the header if the file is
    /// missing or empty. Existing data is preserved.
    pub fn open(path: &Path) -> Result<Self> {
        let needs_header = match File::open(path) {
            Ok(file) => BufReader::new(file).lines().next().is_none(),
            Err(_) => true,
        };

        if needs_header {
            let mut file = File::create(path).context("Failed to create records CSV")?;
            writeln!(file, "{}", CSV_HEADER).context("Failed to write CSV header")?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Appends a record and returns its assigned id.
    pub fn append(&self, record: &MeterRecord) -> Result<RecordId> {
        let _guard = self.write_lock.lock().unwrap();

        let id = self
            .read_all()?
            .iter()
            .map(|(id, _)| *id)
            .max()
            .map_or(1, |max| max + 1);

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .context("Failed to open records CSV for append")?;
        writeln!(file, "{}", format_row(id, record)).context("Failed to write record row")?;

        Ok(id)
    }

    /// Returns all records in file order.
    pub fn list_all(&self) -> Result<Vec<(RecordId, MeterRecord)>> {
        let _guard = self.write_lock.lock().unwrap();
        self.read_all()
    }

    /// Applies a partial update to the record with the given id.
    pub fn update_fields(&self, id: RecordId, update: &RecordUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();

        let mut records = self.read_all()?;
        let entry = records
            .iter_mut()
            .find(|(record_id, _)| *record_id == id)
            .ok_or_else(|| anyhow!("Record {} not found", id))?;

        if let Some(name) = &update.meter_name {
            entry.1.meter_name = name.clone();
        }
        if let Some(reading) = &update.reading {
            entry.1.reading = reading.clone();
        }

        self.rewrite(&records)
    }

    /// Deletes all records whose ids appear in the given list. Unknown ids
    /// are ignored.
    pub fn delete_many(&self, ids: &[RecordId]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();

        let records: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|(id, _)| !ids.contains(id))
            .collect();

        self.rewrite(&records)
    }

    /// True if some record already references this image. Used as the
    /// idempotency check before reprocessing a file.
    pub fn contains_image(&self, image_ref: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        Ok(self
            .read_all()?
            .iter()
            .any(|(_, record)| record.image_ref == image_ref))
    }

    /// Parses the whole file. Malformed rows are skipped with a warning so
    /// one bad line cannot take the store down.
    fn read_all(&self) -> Result<Vec<(RecordId, MeterRecord)>> {
        let file = File::open(&self.path)
            .context(format!("Failed to open records CSV: {}", self.path.display()))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from records CSV")?;
            if line_num == 0 || line.trim().is_empty() {
                continue;
            }
            match parse_row(&line) {
                Ok(entry) => records.push(entry),
                Err(e) => {
                    crate::log(&format!(
                        "Warning: skipping malformed record row {}: {}",
                        line_num + 1,
                        e
                    ));
                }
            }
        }

        Ok(records)
    }

    /// Rewrites the whole file: header plus the given rows.
    fn rewrite(&self, records: &[(RecordId, MeterRecord)]) -> Result<()> {
        let mut file = File::create(&self.path).context("Failed to rewrite records CSV")?;
        writeln!(file, "{}", CSV_HEADER)?;
        for (id, record) in records {
            writeln!(file, "{}", format_row(*id, record))?;
        }
        Ok(())
    }
}

/// Formats one CSV row. The store is line-oriented without quoting, so
/// commas in free-text fields are flattened to spaces.
fn format_row(id: RecordId, record: &MeterRecord) -> String {
    let clean = |s: &str| s.replace(',', " ");
    format!(
        "{},{},{},{},{},{}",
        id,
        clean(&record.date),
        clean(&record.time),
        clean(&record.meter_name),
        clean(&record.reading),
        clean(&record.image_ref),
    )
}

/// Parses one CSV row into an id and record.
fn parse_row(line: &str) -> Result<(RecordId, MeterRecord)> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 6 {
        return Err(anyhow!("Expected 6 columns, got {}", parts.len()));
    }

    let id = parts[0].parse::<RecordId>().context("Invalid record id")?;
    Ok((
        id,
        MeterRecord {
            date: parts[1].to_string(),
            time: parts[2].to_string(),
            meter_name: parts[3].to_string(),
            reading: parts[4].to_string(),
            image_ref: parts[5].to_string(),
        },
    ))
}
