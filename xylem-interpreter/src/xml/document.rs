//! The in-memory XML document model the engine evaluates against.
//!
//! Nodes are records in a flat vector, identified by their index. Indices
//! are assigned in document preorder, so document-order comparison between
//! two nodes of the same document is an integer comparison; ordering
//! across documents uses the document's order key. Documents are immutable
//! once built: nodes constructed during evaluation live in fresh documents
//! of their own (see the constructor evaluator).

use std::sync::Arc;

pub type NodeId = usize;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lexical name, prefix included (`ns:id`).
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn prefix(&self) -> &str {
        self.name.split_once(':').map(|(p, _)| p).unwrap_or("")
    }

    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map(|(_, l)| l).unwrap_or(&self.name)
    }

    /// `xmlns` / `xmlns:prefix` declarations are not attribute nodes on
    /// the attribute axis.
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    /// Element with its lexical name (`prefix:local` or `local`).
    Element { name: String },
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    /// Synthetic node materialised for the namespace axis.
    Namespace { prefix: String, uri: String },
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub parent: Option<NodeId>,
    pub content: NodeContent,
    pub attributes: Vec<Attribute>,
    pub children: Vec<NodeId>,
}

impl NodeRecord {
    pub fn element(name: impl Into<String>) -> Self {
        NodeRecord {
            parent: None,
            content: NodeContent::Element { name: name.into() },
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        NodeRecord {
            parent: None,
            content: NodeContent::Text(value.into()),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.content, NodeContent::Element { .. })
    }
}

/// A read-only XML document (or constructed fragment).
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub nodes: Vec<NodeRecord>,
    /// Top-level nodes in document order.
    pub roots: Vec<NodeId>,
    pub base_uri: String,
    /// Total order across documents within one engine instance; parsed
    /// documents sort before constructed fragments.
    pub order_key: u64,
}

impl Document {
    pub fn node(&self, id: NodeId) -> &NodeRecord {
        &self.nodes[id]
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// The element name of `id`, or the target for processing
    /// instructions, or the prefix for namespace nodes. Text and comment
    /// nodes have no name.
    pub fn node_name(&self, id: NodeId) -> &str {
        match &self.node(id).content {
            NodeContent::Element { name } => name,
            NodeContent::ProcessingInstruction { target, .. } => target,
            NodeContent::Namespace { prefix, .. } => prefix,
            _ => "",
        }
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        let name = self.node_name(id);
        name.split_once(':').map(|(_, l)| l).unwrap_or(name)
    }

    pub fn prefix(&self, id: NodeId) -> &str {
        let name = self.node_name(id);
        name.split_once(':').map(|(p, _)| p).unwrap_or("")
    }

    /// Concatenated text of the node's subtree (the XPath string-value).
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.node(id).content {
            NodeContent::Text(text) => text.clone(),
            NodeContent::Comment(text) => text.clone(),
            NodeContent::ProcessingInstruction { data, .. } => data.clone(),
            NodeContent::Namespace { uri, .. } => uri.clone(),
            NodeContent::Element { .. } => {
                let mut value = String::new();
                self.collect_text(id, &mut value);
                value
            }
        }
    }

    fn collect_text(&self, id: NodeId, into: &mut String) {
        for &child in &self.node(id).children {
            match &self.node(child).content {
                NodeContent::Text(text) => into.push_str(text),
                NodeContent::Element { .. } => self.collect_text(child, into),
                _ => {}
            }
        }
    }

    /// The highest node id inside the subtree rooted at `id`. With
    /// preorder ids this bounds the descendant range.
    pub fn subtree_end(&self, id: NodeId) -> NodeId {
        let mut last = id;
        let mut node = self.node(id);
        while let Some(&child) = node.children.last() {
            last = child;
            node = self.node(child);
        }
        last
    }

    pub fn attribute_value(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    /// Resolves a namespace prefix in scope at `id` by walking `xmlns`
    /// declarations toward the root. The `xml` prefix is always bound.
    pub fn resolve_prefix(&self, id: NodeId, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE.into());
        }
        let wanted = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if let Some(value) = self
                .node(node_id)
                .attributes
                .iter()
                .find(|attribute| attribute.name == wanted)
            {
                if value.value.is_empty() {
                    // an empty declaration undeclares the default namespace
                    return None;
                }
                return Some(value.value.clone());
            }
            current = node.parent;
        }
        None
    }

    /// The namespace URI of an element, honouring in-scope declarations.
    pub fn namespace_uri(&self, id: NodeId) -> Option<String> {
        if !self.node(id).is_element() {
            return None;
        }
        let prefix = self.prefix(id);
        self.resolve_prefix(id, prefix)
    }

    /// All in-scope namespace declarations at `id`, nearest declaration
    /// winning; shadowed prefixes are removed. The `xml` binding is always
    /// present.
    pub fn in_scope_namespaces(&self, id: NodeId) -> Vec<(String, String)> {
        let mut bindings: Vec<(String, String)> = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            for attribute in &self.node(node_id).attributes {
                let prefix = if attribute.name == "xmlns" {
                    ""
                } else if let Some(rest) = attribute.name.strip_prefix("xmlns:") {
                    rest
                } else {
                    continue;
                };
                if seen.iter().any(|existing| existing == prefix) {
                    continue;
                }
                seen.push(prefix.to_string());
                // an empty value undeclares the prefix for this subtree
                if !attribute.value.is_empty() {
                    bindings.push((prefix.to_string(), attribute.value.clone()));
                }
            }
            current = self.node(node_id).parent;
        }
        if !bindings.iter().any(|(prefix, _)| prefix == "xml") {
            bindings.push(("xml".into(), XML_NAMESPACE.into()));
        }
        bindings.sort();
        bindings
    }
}

/// A node (or attribute of a node) in a specific document. This is the
/// item type node-sets are made of.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub doc: Arc<Document>,
    pub node: NodeId,
    /// When set, this entry denotes an attribute of `node` rather than the
    /// node itself.
    pub attribute: Option<usize>,
}

impl NodeEntry {
    pub fn element(doc: Arc<Document>, node: NodeId) -> Self {
        NodeEntry {
            doc,
            node,
            attribute: None,
        }
    }

    pub fn attribute(doc: Arc<Document>, node: NodeId, index: usize) -> Self {
        NodeEntry {
            doc,
            node,
            attribute: Some(index),
        }
    }

    pub fn is_attribute(&self) -> bool {
        self.attribute.is_some()
    }

    pub fn attribute_record(&self) -> Option<&Attribute> {
        self.attribute
            .and_then(|index| self.doc.node(self.node).attributes.get(index))
    }

    /// Sort key giving total document order: attributes order directly
    /// after their owner element, in declaration order.
    pub fn order_key(&self) -> (u64, NodeId, usize) {
        (
            self.doc.order_key,
            self.node,
            self.attribute.map(|index| index + 1).unwrap_or(0),
        )
    }

    pub fn string_value(&self) -> String {
        match self.attribute_record() {
            Some(attribute) => attribute.value.clone(),
            None => self.doc.string_value(self.node),
        }
    }

    pub fn name(&self) -> String {
        match self.attribute_record() {
            Some(attribute) => attribute.name.clone(),
            None => self.doc.node_name(self.node).to_string(),
        }
    }

    pub fn local_name(&self) -> String {
        match self.attribute_record() {
            Some(attribute) => attribute.local_name().to_string(),
            None => self.doc.local_name(self.node).to_string(),
        }
    }

    /// Same node identity (not value equality).
    pub fn same_node(&self, other: &NodeEntry) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc)
            && self.node == other.node
            && self.attribute == other.attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        // <root a="1"><x>hi</x><y/></root>
        let mut doc = Document::default();
        doc.nodes.push(NodeRecord {
            parent: None,
            content: NodeContent::Element {
                name: "root".into(),
            },
            attributes: vec![Attribute {
                name: "a".into(),
                value: "1".into(),
            }],
            children: vec![1, 3],
        });
        doc.nodes.push(NodeRecord {
            parent: Some(0),
            content: NodeContent::Element { name: "x".into() },
            attributes: Vec::new(),
            children: vec![2],
        });
        doc.nodes.push(NodeRecord {
            parent: Some(1),
            content: NodeContent::Text("hi".into()),
            attributes: Vec::new(),
            children: Vec::new(),
        });
        doc.nodes.push(NodeRecord {
            parent: Some(0),
            content: NodeContent::Element { name: "y".into() },
            attributes: Vec::new(),
            children: Vec::new(),
        });
        doc.roots.push(0);
        doc
    }

    #[test]
    fn string_value_concatenates_descendant_text() {
        let doc = sample();
        assert_eq!(doc.string_value(0), "hi");
        assert_eq!(doc.string_value(2), "hi");
        assert_eq!(doc.string_value(3), "");
    }

    #[test]
    fn subtree_end_bounds_descendants() {
        let doc = sample();
        assert_eq!(doc.subtree_end(0), 3);
        assert_eq!(doc.subtree_end(1), 2);
        assert_eq!(doc.subtree_end(3), 3);
    }

    #[test]
    fn attribute_entries_order_after_element() {
        let doc = Arc::new(sample());
        let element = NodeEntry::element(doc.clone(), 0);
        let attribute = NodeEntry::attribute(doc, 0, 0);
        assert!(element.order_key() < attribute.order_key());
        assert_eq!(attribute.string_value(), "1");
        assert_eq!(attribute.name(), "a");
    }

    #[test]
    fn xml_prefix_is_always_bound() {
        let doc = sample();
        assert_eq!(doc.resolve_prefix(1, "xml"), Some(XML_NAMESPACE.into()));
        assert_eq!(doc.resolve_prefix(1, "missing"), None);
    }
}
