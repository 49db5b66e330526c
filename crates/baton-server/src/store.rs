//! Replicated record store
//!
//! A flat file of text records separated by `%` lines, loaded fully into
//! memory at startup. Reads pick a random record; writes append to the file
//! and are replicated to the peers by the console under the distributed lock.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info};

use baton_api::Message;
use baton_common::error::BatonError;
use baton_core::MessageHandler;

/// Line that terminates a record in the store file.
pub const RECORD_DELIMITER: &str = "%";

pub struct RecordStore {
    path: PathBuf,
    entries: Mutex<Vec<String>>,
}

impl RecordStore {
    /// Opens the store file, creating it (and parent directories) if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BatonError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !path.exists() {
            File::create(&path)?;
        }

        let entries = Self::load(&path)?;
        info!("Record store opened with {} entries: {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn load(path: &Path) -> Result<Vec<String>, BatonError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        let mut current = String::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim_end() == RECORD_DELIMITER {
                if !current.trim().is_empty() {
                    entries.push(current.trim_end().to_string());
                }
                current.clear();
            } else {
                current.push_str(&line);
                current.push('\n');
            }
        }
        // Trailing content without a closing delimiter still counts.
        if !current.trim().is_empty() {
            entries.push(current.trim_end().to_string());
        }

        Ok(entries)
    }

    /// Returns a random record, or `None` if the store is empty.
    pub fn read(&self) -> Option<String> {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..entries.len());
        Some(entries[index].clone())
    }

    /// Appends a record to the file and the in-memory list.
    pub fn write(&self, text: &str) -> Result<(), BatonError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BatonError::Parse("empty record".to_string()));
        }

        let mut entries = self.entries.lock();
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", text)?;
        writeln!(file, "{}", RECORD_DELIMITER)?;
        file.flush()?;
        entries.push(text.to_string());
        debug!("Record appended, store now holds {} entries", entries.len());

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Applies replicated writes received from other peers.
pub struct WriteEntryHandler {
    store: Arc<RecordStore>,
}

impl WriteEntryHandler {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for WriteEntryHandler {
    async fn handle(&self, message: Message) {
        if let Message::WriteEntry { text } = message {
            if let Err(e) = self.store.write(&text) {
                tracing::warn!("Replicated write failed: {}", e);
            }
        }
    }

    fn can_handle(&self) -> &'static str {
        "write_entry"
    }
}
