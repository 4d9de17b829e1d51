//! Persistent, transactional document model with incremental recomputation.
//!
//! The crate organizes application data as typed Nodes living in Partitions,
//! addressed by stable arena handles. Every write happens inside a
//! transactional scope journaled for undo and redo. Computation units
//! ("tree functions") anchored on Nodes consume and produce Parameters; a
//! dependency graph derived from that wiring drives passes that recompute
//! only what the modification logbook says is stale.
//!
//! Typical flow:
//!
//! ```no_run
//! use arbordoc::model::{Document, DocumentConfig, ParamValue, TypeTag, VariableKind};
//!
//! let mut doc = Document::new(DocumentConfig::default());
//! doc.open_command();
//! let radius = doc.add_variable(VariableKind::Real, "r");
//! let shape = doc.create_node(&TypeTag::of("var.real"), "area");
//! let area = doc.add_param(shape, "Value", ParamValue::Real(0.0));
//! doc.connect_evaluator(area, "3.14159 * r * r");
//! doc.commit_command(None);
//! doc.execute(None);
//! ```

pub mod clipboard;
pub mod exec;
pub mod expr;
pub mod func;
pub mod graph;
pub mod logbook;
pub mod model;
pub mod observe;
pub mod store;
pub mod tx;

pub use exec::ExecutionStatus;
pub use graph::GraphState;
pub use model::{Document, DocumentConfig};
