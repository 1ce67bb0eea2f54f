//! JSON-lines export of extracted records

use crate::model::PostRecord;
use crate::HarvestError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Appends every extracted record to a file, one JSON object per line
///
/// Non-ASCII text is written as UTF-8, not escaped.
#[derive(Debug)]
pub struct FeedWriter {
    out: Mutex<BufWriter<File>>,
}

impl FeedWriter {
    /// Opens the feed file for appending, creating it if needed
    pub fn open(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn append(&self, record: &PostRecord) -> Result<(), HarvestError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), HarvestError> {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}
