pub mod build;
pub mod document;
pub mod parse;
pub mod serialize;

pub use build::{copy_subtree, freeze, BuildNode};
pub use document::{Attribute, Document, NodeContent, NodeEntry, NodeId, XML_NAMESPACE};
pub use parse::{parse_document, XmlError};
pub use serialize::{serialize_entry, serialize_node};
