//! Work queue and worker loop for batch image processing.
//!
//! Uses std::sync::mpsc for producer/consumer communication: the submitting
//! side queues image paths, the worker processes them one at a time with the
//! shared recognizer and appends results to the record store. Invocations
//! are independent, so additional workers can drain the same store safely.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::config::PipelineConfig;
use crate::ocr::{self, TextRecognizer};
use crate::store::{MeterRecord, RecordStore};

/// A queued image to digitize.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Path to the source photo.
    pub image_path: PathBuf,
    /// Timestamp when the item was queued.
    pub queued_at: DateTime<Local>,
}

impl WorkItem {
    pub fn new(image_path: PathBuf) -> Self {
        Self {
            image_path,
            queued_at: Local::now(),
        }
    }
}

/// Creates a new work queue. The channel is unbounded; items queue up if
/// recognition is slower than submission.
pub fn create_work_queue() -> (Sender<WorkItem>, Receiver<WorkItem>) {
    channel()
}

/// Runs the worker loop until the channel closes (sender dropped).
///
/// Each item is checked against the store first (idempotency by image file
/// name), then normalized, recognized, extracted, archived into
/// `uploads_dir`, and appended. A failing item is logged and skipped; the
/// loop keeps going. No record is written unless its photo was archived,
/// so every stored image_ref stays resolvable.
pub fn run_worker<R: TextRecognizer>(
    receiver: Receiver<WorkItem>,
    recognizer: &R,
    store: &RecordStore,
    config: &PipelineConfig,
    uploads_dir: &Path,
) {
    crate::log("Worker started");

    while let Ok(item) = receiver.recv() {
        crate::log(&format!(
            "Worker: processing {} (queued {})",
            item.image_path.display(),
            item.queued_at.format("%H:%M:%S")
        ));

        let image_ref = item
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match store.contains_image(&image_ref) {
            Ok(true) => {
                crate::log(&format!("Skipping {}: already processed", image_ref));
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                crate::log(&format!("Worker: store lookup failed for {}: {}", image_ref, e));
                continue;
            }
        }

        let img = match image::open(&item.image_path) {
            Ok(img) => img,
            Err(e) => {
                crate::log(&format!(
                    "Worker: failed to load {}: {}",
                    item.image_path.display(),
                    e
                ));
                continue;
            }
        };

        let reading = match ocr::read_meter(&img, recognizer, config) {
            Ok(reading) => reading,
            Err(e) => {
                crate::log(&format!("Worker: pipeline failed for {}: {}", image_ref, e));
                continue;
            }
        };

        // Keep a copy of the source photo so the stored reference stays
        // resolvable after the original is moved or deleted. A record whose
        // photo could not be archived would carry an orphaned reference, so
        // the item is dropped instead.
        let dest = uploads_dir.join(&image_ref);
        if item.image_path != dest {
            if let Err(e) = std::fs::copy(&item.image_path, &dest) {
                crate::log(&format!(
                    "Worker: failed to archive {}, skipping: {}",
                    image_ref, e
                ));
                continue;
            }
        }

        let record = MeterRecord::new(&config.default_meter_name, reading.value(), &image_ref);
        match store.append(&record) {
            Ok(id) => {
                crate::log(&format!(
                    "Recorded #{}: {} = {}{}",
                    id,
                    image_ref,
                    reading.value(),
                    if reading.is_confident() { "" } else { " (needs review)" }
                ));
            }
            Err(e) => {
                crate::log(&format!("Worker: failed to append record for {}: {}", image_ref, e));
            }
        }
    }

    crate::log("Worker finished: queue closed");
}
