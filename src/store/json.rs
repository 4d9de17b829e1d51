//! JSON persistence backend.

use super::{DocumentSnapshot, DocumentStore, ReaderStatus, WriterStatus};
use crate::model::{Document, DocumentConfig};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Pretty-printed JSON on disk, one file per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStore;

impl DocumentStore for JsonStore {
    fn save(&self, doc: &Document, path: &Path) -> Result<(), WriterStatus> {
        let snapshot = DocumentSnapshot::capture(doc);
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &snapshot)?;
        Ok(())
    }

    fn load(&self, path: &Path, config: DocumentConfig) -> Result<Document, ReaderStatus> {
        let file = File::open(path)?;
        let snapshot: DocumentSnapshot = serde_json::from_reader(BufReader::new(file))?;
        snapshot.restore(config)
    }
}
