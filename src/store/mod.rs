//! Whole-document persistence.
//!
//! A save captures the live arenas and Partition registries into a
//! [`DocumentSnapshot`] and hands it to a [`DocumentStore`] backend. The
//! transaction history, the logbook and the session registry are deliberately
//! not part of the payload; a loaded document starts with clean stacks and
//! whatever drivers the application registers.

mod json;
mod snapshot;

pub use json::JsonStore;
pub use snapshot::DocumentSnapshot;

use crate::model::{Document, DocumentConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Major format version written into every saved document. Bumped whenever
/// the snapshot layout changes incompatibly.
pub const FRAMEWORK_VERSION: u32 = 1;

/// Version stamp carried by every document: the framework format version
/// plus the application data version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub framework: u32,
    pub app: u32,
}

impl VersionRecord {
    pub fn current(app: u32) -> Self {
        Self {
            framework: FRAMEWORK_VERSION,
            app,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReaderStatus {
    #[error("cannot open document: {0}")]
    OpenFailed(#[from] std::io::Error),
    #[error("malformed document payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("document format version {found} is newer than supported {supported}")]
    VersionMismatch { found: u32, supported: u32 },
}

#[derive(Error, Debug)]
pub enum WriterStatus {
    #[error("cannot write document: {0}")]
    WriteFailed(#[from] std::io::Error),
    #[error("document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence backend seam. The JSON backend is the reference
/// implementation; applications may plug binary or networked stores.
pub trait DocumentStore {
    fn save(&self, doc: &Document, path: &Path) -> Result<(), WriterStatus>;

    fn load(&self, path: &Path, config: DocumentConfig) -> Result<Document, ReaderStatus>;
}

impl Document {
    /// Saves through the given backend and marks the document clean.
    pub fn save_as(&mut self, store: &dyn DocumentStore, path: &Path) -> Result<(), WriterStatus> {
        store.save(self, path)?;
        self.set_clean();
        tracing::info!(target: "arbordoc", path = %path.display(), "document saved");
        Ok(())
    }

    /// Loads a document through the given backend. The registry and limits
    /// come from `config`; undo history does not survive persistence.
    pub fn open_from(
        store: &dyn DocumentStore,
        path: &Path,
        config: DocumentConfig,
    ) -> Result<Document, ReaderStatus> {
        let doc = store.load(path, config)?;
        tracing::info!(target: "arbordoc", path = %path.display(), "document loaded");
        Ok(doc)
    }
}
