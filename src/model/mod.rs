//! The document model: handles, values, Nodes, Partitions and the Document.

mod document;
mod id;
mod node;
mod param;
mod partition;
mod value;

pub use document::{Document, DocumentConfig, VariableKind};
pub use id::{FuncId, NodeId, ParamId, TypeTag};
pub use node::Node;
pub use param::Parameter;
pub use partition::Partition;
pub use value::ParamValue;
