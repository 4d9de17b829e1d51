//! The serialized form of a document.

use super::{ReaderStatus, VersionRecord, FRAMEWORK_VERSION};
use crate::clipboard::CopyBuffer;
use crate::func::FuncInstance;
use crate::logbook::LogBook;
use crate::model::{Document, DocumentConfig, Node, Partition};
use serde::{Deserialize, Serialize};

/// Everything a document persists: the version stamp, both arenas, the
/// Partition registries, the pending-recompute ledger and the copy-paste
/// staging area. Arena slots are kept verbatim, `None` holes included, so
/// every persisted handle stays valid after a load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub version: VersionRecord,
    pub nodes: Vec<Option<Node>>,
    pub partitions: Vec<Partition>,
    pub instances: Vec<Option<FuncInstance>>,
    pub logbook: LogBook,
    pub clipboard: Option<CopyBuffer>,
}

impl DocumentSnapshot {
    pub fn capture(doc: &Document) -> Self {
        Self {
            version: *doc.version(),
            nodes: doc.nodes.clone(),
            partitions: doc.partitions.values().cloned().collect(),
            instances: doc.funcs.clone(),
            logbook: doc.logbook().clone(),
            clipboard: doc.clipboard().buffer().cloned(),
        }
    }

    /// Rebuilds a live document around the snapshot. Partitions named by the
    /// payload are registered on top of the configured set, so documents
    /// saved by a richer application still open.
    pub fn restore(self, config: DocumentConfig) -> Result<Document, ReaderStatus> {
        if self.version.framework > FRAMEWORK_VERSION {
            return Err(ReaderStatus::VersionMismatch {
                found: self.version.framework,
                supported: FRAMEWORK_VERSION,
            });
        }
        let mut doc = Document::new(config);
        doc.version = self.version;
        doc.nodes = self.nodes;
        doc.funcs = self.instances;
        doc.logbook = self.logbook;
        for partition in self.partitions {
            doc.partitions.insert(partition.tag.clone(), partition);
        }
        if let Some(buffer) = self.clipboard {
            doc.clipboard.set_buffer(buffer);
        }
        Ok(doc)
    }
}
