//! The 13 XPath axes over the document model.
//!
//! Node ids are preorder positions, so document-order comparison is an
//! integer comparison and the original's pairwise order cache collapses
//! into the sort key; the ancestor-path cache is kept because `ancestor`,
//! `preceding` and `following` all walk rootward repeatedly.

use std::sync::Arc;

use ahash::AHashMap;

use crate::xml::{freeze, BuildNode, NodeContent, NodeEntry, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    Namespace,
}

impl Axis {
    pub fn parse(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfAxis,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::SelfAxis => "self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
            Axis::Attribute => "attribute",
            Axis::Namespace => "namespace",
        }
    }

    /// Reverse axes serialise their results in reverse document order.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }
}

/// Expands axes for context entries. One evaluator instance lives per
/// query evaluation; its caches are cleared between evaluations.
#[derive(Debug, Default)]
pub struct AxisEvaluator {
    // node → [root .. node] ancestor chain
    ancestor_paths: AHashMap<(u64, NodeId), Vec<NodeId>>,
}

impl AxisEvaluator {
    pub fn new() -> Self {
        AxisEvaluator::default()
    }

    pub fn reset(&mut self) {
        self.ancestor_paths.clear();
    }

    /// A cheap upper bound on the axis result size, used to size pool
    /// buffers.
    pub fn estimate_result_size(&self, axis: Axis, entry: &NodeEntry) -> usize {
        if entry.is_attribute() {
            return match axis {
                Axis::SelfAxis | Axis::Parent => 1,
                Axis::Ancestor | Axis::AncestorOrSelf => 8,
                _ => 0,
            };
        }
        let doc = &entry.doc;
        let record = doc.node(entry.node);
        match axis {
            Axis::Child => record.children.len(),
            Axis::Attribute => record.attributes.len(),
            Axis::SelfAxis | Axis::Parent => 1,
            Axis::Descendant | Axis::DescendantOrSelf => {
                doc.subtree_end(entry.node) - entry.node + 1
            }
            Axis::Ancestor | Axis::AncestorOrSelf => 8,
            Axis::FollowingSibling | Axis::PrecedingSibling => record
                .parent
                .map(|parent| doc.node(parent).children.len())
                .unwrap_or(1),
            Axis::Following | Axis::Preceding => doc.nodes.len(),
            Axis::Namespace => 4,
        }
    }

    /// Expands `axis` from `entry`, appending matches to `output` in axis
    /// order (document order, or reverse document order for reverse axes).
    pub fn evaluate_axis(&mut self, axis: Axis, entry: &NodeEntry, output: &mut Vec<NodeEntry>) {
        if entry.is_attribute() {
            self.evaluate_from_attribute(axis, entry, output);
            return;
        }
        let doc = &entry.doc;
        let node = entry.node;
        match axis {
            Axis::Child => {
                for &child in &doc.node(node).children {
                    output.push(NodeEntry::element(doc.clone(), child));
                }
            }
            Axis::Descendant => self.collect_descendants(doc, node, output),
            Axis::DescendantOrSelf => {
                output.push(entry.clone());
                self.collect_descendants(doc, node, output);
            }
            Axis::Parent => {
                if let Some(parent) = doc.node(node).parent {
                    output.push(NodeEntry::element(doc.clone(), parent));
                }
            }
            Axis::Ancestor => {
                let path = self.ancestor_path(entry);
                for &ancestor in path.iter().rev().skip(1) {
                    output.push(NodeEntry::element(doc.clone(), ancestor));
                }
            }
            Axis::AncestorOrSelf => {
                let path = self.ancestor_path(entry);
                for &ancestor in path.iter().rev() {
                    output.push(NodeEntry::element(doc.clone(), ancestor));
                }
            }
            Axis::SelfAxis => output.push(entry.clone()),
            Axis::FollowingSibling => {
                if let Some(parent) = doc.node(node).parent {
                    let siblings = &doc.node(parent).children;
                    if let Some(index) = siblings.iter().position(|&sibling| sibling == node) {
                        for &sibling in &siblings[index + 1..] {
                            output.push(NodeEntry::element(doc.clone(), sibling));
                        }
                    }
                }
            }
            Axis::PrecedingSibling => {
                if let Some(parent) = doc.node(node).parent {
                    let siblings = &doc.node(parent).children;
                    if let Some(index) = siblings.iter().position(|&sibling| sibling == node) {
                        for &sibling in siblings[..index].iter().rev() {
                            output.push(NodeEntry::element(doc.clone(), sibling));
                        }
                    }
                }
            }
            Axis::Following => {
                // nodes after the subtree, in document order
                let end = doc.subtree_end(node);
                for id in (end + 1)..doc.nodes.len() {
                    output.push(NodeEntry::element(doc.clone(), id));
                }
            }
            Axis::Preceding => {
                // nodes before the context, ancestors excluded, in
                // reverse document order
                let path = self.ancestor_path(entry);
                for id in (0..node).rev() {
                    if path.contains(&id) {
                        continue;
                    }
                    output.push(NodeEntry::element(doc.clone(), id));
                }
            }
            Axis::Attribute => {
                for (index, attribute) in doc.node(node).attributes.iter().enumerate() {
                    if attribute.is_namespace_declaration() {
                        continue;
                    }
                    output.push(NodeEntry::attribute(doc.clone(), node, index));
                }
            }
            Axis::Namespace => {
                self.materialise_namespace_nodes(entry, output);
            }
        }
    }

    fn evaluate_from_attribute(
        &mut self,
        axis: Axis,
        entry: &NodeEntry,
        output: &mut Vec<NodeEntry>,
    ) {
        let doc = &entry.doc;
        match axis {
            Axis::SelfAxis => output.push(entry.clone()),
            Axis::Parent => output.push(NodeEntry::element(doc.clone(), entry.node)),
            Axis::Ancestor => {
                let owner = NodeEntry::element(doc.clone(), entry.node);
                let path = self.ancestor_path(&owner);
                for &ancestor in path.iter().rev() {
                    output.push(NodeEntry::element(doc.clone(), ancestor));
                }
            }
            Axis::AncestorOrSelf => {
                output.push(entry.clone());
                let owner = NodeEntry::element(doc.clone(), entry.node);
                let path = self.ancestor_path(&owner);
                for &ancestor in path.iter().rev() {
                    output.push(NodeEntry::element(doc.clone(), ancestor));
                }
            }
            // attributes have no children, siblings or following/preceding
            // nodes of their own
            _ => {}
        }
    }

    fn collect_descendants(
        &self,
        doc: &Arc<crate::xml::Document>,
        node: NodeId,
        output: &mut Vec<NodeEntry>,
    ) {
        // preorder ids make the descendant range contiguous
        let end = doc.subtree_end(node);
        for id in (node + 1)..=end {
            output.push(NodeEntry::element(doc.clone(), id));
        }
    }

    /// `[root .. node]` chain, memoised per node.
    fn ancestor_path(&mut self, entry: &NodeEntry) -> Vec<NodeId> {
        let key = (entry.doc.order_key, entry.node);
        if let Some(path) = self.ancestor_paths.get(&key) {
            return path.clone();
        }
        let mut path = Vec::new();
        let mut current = Some(entry.node);
        while let Some(id) = current {
            path.push(id);
            current = entry.doc.node(id).parent;
        }
        path.reverse();
        self.ancestor_paths.insert(key, path.clone());
        path
    }

    // In-scope namespace bindings materialised as synthetic nodes, sorted
    // by prefix; `xml` is always present and shadowed prefixes are
    // already removed by the document walk.
    fn materialise_namespace_nodes(&self, entry: &NodeEntry, output: &mut Vec<NodeEntry>) {
        if !entry.doc.node(entry.node).is_element() {
            return;
        }
        let bindings = entry.doc.in_scope_namespaces(entry.node);
        let nodes: Vec<BuildNode> = bindings
            .into_iter()
            .map(|(prefix, uri)| BuildNode {
                content: NodeContent::Namespace { prefix, uri },
                attributes: Vec::new(),
                children: Vec::new(),
            })
            .collect();
        let count = nodes.len();
        let doc = freeze(nodes, entry.doc.base_uri.clone(), u64::MAX);
        for id in 0..count {
            output.push(NodeEntry::element(doc.clone(), id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn doc() -> Arc<crate::xml::Document> {
        parse_document(
            r#"<r><a><b/><c/></a><d x="1" y="2"><e/></d><f/></r>"#,
            "",
            0,
        )
        .unwrap()
    }

    fn names(entries: &[NodeEntry]) -> Vec<String> {
        entries.iter().map(NodeEntry::name).collect()
    }

    fn expand(axis: Axis, entry: &NodeEntry) -> Vec<NodeEntry> {
        let mut evaluator = AxisEvaluator::new();
        let mut output = Vec::new();
        evaluator.evaluate_axis(axis, entry, &mut output);
        output
    }

    #[test]
    fn child_axis_in_document_order() {
        let doc = doc();
        let root = NodeEntry::element(doc, 0);
        assert_eq!(names(&expand(Axis::Child, &root)), vec!["a", "d", "f"]);
    }

    #[test]
    fn descendant_axis_covers_subtree() {
        let doc = doc();
        let root = NodeEntry::element(doc.clone(), 0);
        assert_eq!(
            names(&expand(Axis::Descendant, &root)),
            vec!["a", "b", "c", "d", "e", "f"]
        );
        let a = NodeEntry::element(doc, 1);
        assert_eq!(names(&expand(Axis::Descendant, &a)), vec!["b", "c"]);
    }

    #[test]
    fn sibling_axes() {
        let doc = doc();
        // node 4 is <d>
        let d = NodeEntry::element(doc, 4);
        assert_eq!(names(&expand(Axis::FollowingSibling, &d)), vec!["f"]);
        assert_eq!(names(&expand(Axis::PrecedingSibling, &d)), vec!["a"]);
    }

    #[test]
    fn following_and_preceding() {
        let doc = doc();
        let a = NodeEntry::element(doc.clone(), 1);
        // following excludes descendants b, c
        assert_eq!(names(&expand(Axis::Following, &a)), vec!["d", "e", "f"]);
        let e = NodeEntry::element(doc, 5);
        // preceding excludes ancestors d, r; reverse document order
        assert_eq!(names(&expand(Axis::Preceding, &e)), vec!["c", "b", "a"]);
    }

    #[test]
    fn ancestor_axes_are_rootward() {
        let doc = doc();
        let b = NodeEntry::element(doc, 2);
        assert_eq!(names(&expand(Axis::Ancestor, &b)), vec!["a", "r"]);
        assert_eq!(
            names(&expand(Axis::AncestorOrSelf, &b)),
            vec!["b", "a", "r"]
        );
    }

    #[test]
    fn attribute_axis_in_declaration_order() {
        let doc = doc();
        let d = NodeEntry::element(doc, 4);
        let attributes = expand(Axis::Attribute, &d);
        assert_eq!(names(&attributes), vec!["x", "y"]);
        assert!(attributes.iter().all(NodeEntry::is_attribute));
    }

    #[test]
    fn attribute_context_parent_is_owner() {
        let doc = doc();
        let attribute = NodeEntry::attribute(doc, 4, 0);
        assert_eq!(names(&expand(Axis::Parent, &attribute)), vec!["d"]);
        assert!(expand(Axis::Child, &attribute).is_empty());
        assert!(expand(Axis::FollowingSibling, &attribute).is_empty());
    }

    #[test]
    fn namespace_axis_always_has_xml() {
        let doc = parse_document(r#"<r xmlns:a="http://a/"><x/></r>"#, "", 0).unwrap();
        let x = NodeEntry::element(doc, 1);
        let namespaces = expand(Axis::Namespace, &x);
        let prefixes: Vec<String> = namespaces.iter().map(NodeEntry::name).collect();
        assert_eq!(prefixes, vec!["a", "xml"]);
        assert_eq!(namespaces[0].string_value(), "http://a/");
    }

    #[test]
    fn axis_complementarity() {
        // preceding-sibling ∪ self ∪ following-sibling == parent/*
        let doc = doc();
        let d = NodeEntry::element(doc.clone(), 4);
        let mut combined = expand(Axis::PrecedingSibling, &d);
        combined.extend(expand(Axis::SelfAxis, &d));
        combined.extend(expand(Axis::FollowingSibling, &d));
        combined.sort_by_key(NodeEntry::order_key);

        let parent = NodeEntry::element(doc, 0);
        let siblings = expand(Axis::Child, &parent);
        assert_eq!(names(&combined), names(&siblings));
    }
}
