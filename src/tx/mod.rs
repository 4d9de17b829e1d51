//! Transactional scopes, journaled deltas, undo and redo.

mod delta;
mod engine;

pub use delta::{Delta, TxData};
pub use engine::TransactionEngine;

pub(crate) use delta::DeltaEntry;
pub(crate) use engine::DEFAULT_UNDO_LIMIT;
