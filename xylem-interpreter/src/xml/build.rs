//! Builder for assembling documents with correct preorder node ids.
//!
//! Both the XML reader and the constructor evaluator produce trees of
//! [`BuildNode`]s and freeze them into immutable [`Document`]s.

use std::sync::Arc;

use super::document::{Attribute, Document, NodeContent, NodeId, NodeRecord};

#[derive(Debug, Clone)]
pub struct BuildNode {
    pub content: NodeContent,
    pub attributes: Vec<Attribute>,
    pub children: Vec<BuildNode>,
}

impl BuildNode {
    pub fn element(name: impl Into<String>) -> Self {
        BuildNode {
            content: NodeContent::Element { name: name.into() },
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        BuildNode {
            content: NodeContent::Text(value.into()),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn comment(value: impl Into<String>) -> Self {
        BuildNode {
            content: NodeContent::Comment(value.into()),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        BuildNode {
            content: NodeContent::ProcessingInstruction {
                target: target.into(),
                data: data.into(),
            },
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn push_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.push(Attribute {
            name: name.into(),
            value: value.into(),
        });
    }
}

/// Freezes build trees into a document; node ids are assigned in preorder.
pub fn freeze(roots: Vec<BuildNode>, base_uri: impl Into<String>, order_key: u64) -> Arc<Document> {
    let mut document = Document {
        nodes: Vec::new(),
        roots: Vec::new(),
        base_uri: base_uri.into(),
        order_key,
    };
    for root in roots {
        let id = append(&mut document, root, None);
        document.roots.push(id);
    }
    Arc::new(document)
}

fn append(document: &mut Document, node: BuildNode, parent: Option<NodeId>) -> NodeId {
    let id = document.nodes.len();
    document.nodes.push(NodeRecord {
        parent,
        content: node.content,
        attributes: node.attributes,
        children: Vec::new(),
    });
    for child in node.children {
        let child_id = append(document, child, Some(id));
        document.nodes[id].children.push(child_id);
    }
    id
}

/// Deep copy of an existing document subtree into a build tree; used when
/// constructors embed existing nodes, which take new identity per the
/// XQuery construction rules.
pub fn copy_subtree(document: &Document, id: NodeId) -> BuildNode {
    let record = document.node(id);
    BuildNode {
        content: record.content.clone(),
        attributes: record.attributes.clone(),
        children: record
            .children
            .iter()
            .map(|&child| copy_subtree(document, child))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_assigns_preorder_ids() {
        let mut root = BuildNode::element("root");
        let mut first = BuildNode::element("a");
        first.children.push(BuildNode::text("1"));
        root.children.push(first);
        root.children.push(BuildNode::element("b"));

        let doc = freeze(vec![root], "", 0);
        assert_eq!(doc.node_name(0), "root");
        assert_eq!(doc.node_name(1), "a");
        assert_eq!(doc.node_name(3), "b");
        assert_eq!(doc.node(0).children, vec![1, 3]);
        assert_eq!(doc.subtree_end(0), 3);
    }

    #[test]
    fn copy_subtree_preserves_structure() {
        let mut root = BuildNode::element("root");
        root.push_attribute("k", "v");
        root.children.push(BuildNode::text("body"));
        let doc = freeze(vec![root], "", 0);

        let copy = copy_subtree(&doc, 0);
        let copied = freeze(vec![copy], "", 1);
        assert_eq!(copied.string_value(0), "body");
        assert_eq!(copied.attribute_value(0, "k"), Some("v"));
    }
}
