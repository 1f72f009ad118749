//! Node construction: direct element constructors with attribute value
//! templates, and the computed element / attribute / text / comment /
//! processing-instruction / document forms.
//!
//! Every constructor evaluation assembles a build tree and freezes it
//! into a fresh immutable document owned by the returned node-set, so
//! constructed nodes outlive the evaluator when they end up in a result.
//! Embedded existing nodes are deep-copied and take new identity.
//! Namespace scope is inherited structurally: `xmlns` attributes are kept
//! verbatim on the built tree, so prefix resolution walks the new tree
//! exactly as it would a parsed document.

use xylem_xquery_ast::{BoundarySpace, ConstructorAttribute, NodeKind, XPathNode};

use crate::error::{Error, ErrorCode, Result};
use crate::eval::{Evaluator, CONSTRUCTED_ORDER_BASE};
use crate::schema::is_qname;
use crate::value::{NodeSet, XPathVal};
use crate::xml::{copy_subtree, freeze, Attribute, BuildNode, NodeContent, NodeEntry};

impl<'a> Evaluator<'a> {
    pub(crate) fn next_constructed_order_key(&mut self) -> u64 {
        self.constructed_documents += 1;
        CONSTRUCTED_ORDER_BASE + self.constructed_documents
    }

    fn base_uri(&self) -> String {
        self.active_prolog().static_base_uri.clone()
    }

    fn freeze_single(&mut self, node: BuildNode) -> XPathVal {
        let order_key = self.next_constructed_order_key();
        let doc = freeze(vec![node], self.base_uri(), order_key);
        XPathVal::NodeSet(NodeSet::from_sorted(vec![NodeEntry::element(doc, 0)]))
    }

    pub(crate) fn evaluate_direct_element(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let element = self.build_direct_element(node)?;
        Ok(self.freeze_single(element))
    }

    fn build_direct_element(&mut self, node: &XPathNode) -> Result<BuildNode> {
        let info = node
            .constructor
            .as_ref()
            .ok_or_else(|| Error::new(ErrorCode::XPST0003))?;
        let name = if info.prefix.is_empty() {
            info.name.clone()
        } else {
            format!("{}:{}", info.prefix, info.name)
        };
        let mut element = BuildNode::element(name);

        for attribute in &info.attributes {
            let value = self.evaluate_attribute_value_template(attribute)?;
            let attribute_name = if attribute.prefix.is_empty() {
                attribute.name.clone()
            } else {
                format!("{}:{}", attribute.prefix, attribute.name)
            };
            element.attributes.push(Attribute {
                name: attribute_name,
                value,
            });
        }

        // a prolog-declared prefix with no in-scope declaration gets an
        // explicit xmlns attribute so the built tree resolves on its own
        if !info.prefix.is_empty() {
            let declared = format!("xmlns:{}", info.prefix);
            if !element
                .attributes
                .iter()
                .any(|attribute| attribute.name == declared)
            {
                if let Some(uri) = self.active_prolog().resolve_prefix(&info.prefix) {
                    if info.prefix != "xml" {
                        element.attributes.push(Attribute {
                            name: declared,
                            value: uri.to_string(),
                        });
                    }
                }
            }
        }

        let preserve_space =
            self.active_prolog().boundary_space == BoundarySpace::Preserve;
        for child in &node.children {
            match child.kind {
                NodeKind::TextContent => {
                    if !preserve_space && child.value.trim().is_empty() {
                        continue;
                    }
                    element.children.push(BuildNode::text(child.value.clone()));
                }
                NodeKind::DirectElement => {
                    let nested = self.build_direct_element(child)?;
                    element.children.push(nested);
                }
                NodeKind::PiConstructor if child.name_expression.is_none() => {
                    let data = child
                        .children
                        .first()
                        .map(|content| content.value.clone())
                        .unwrap_or_default();
                    element
                        .children
                        .push(BuildNode::processing_instruction(child.value.clone(), data));
                }
                _ => {
                    let value = self.evaluate_node(child)?;
                    self.append_content(&mut element, value, true)?;
                }
            }
        }
        Ok(element)
    }

    fn evaluate_attribute_value_template(
        &mut self,
        attribute: &ConstructorAttribute,
    ) -> Result<String> {
        let mut value = String::new();
        for part in &attribute.value_parts {
            if !part.is_expression {
                value.push_str(&part.text);
                continue;
            }
            let Some(expression) = &part.expression else {
                continue;
            };
            let evaluated = self.evaluate_node(expression)?;
            let items = evaluated.atomized();
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    value.push(' ');
                }
                value.push_str(&item.to_string_value());
            }
        }
        Ok(value)
    }

    // Appends an evaluated content value to an element under construction:
    // nodes are copied in, attribute nodes become attributes, adjacent
    // atomics join into one space-separated text node.
    fn append_content(
        &mut self,
        element: &mut BuildNode,
        value: XPathVal,
        allow_attributes: bool,
    ) -> Result<()> {
        let mut pending_text: Option<String> = None;

        let mut flush = |element: &mut BuildNode, pending: &mut Option<String>| {
            if let Some(text) = pending.take() {
                element.children.push(BuildNode::text(text));
            }
        };

        for item in value.items() {
            match item {
                XPathVal::Empty => {}
                XPathVal::NodeSet(set) => {
                    flush(element, &mut pending_text);
                    for entry in &set.entries {
                        if let Some(attribute) = entry.attribute_record() {
                            if !allow_attributes || !element.children.is_empty() {
                                return Err(Error::with_message(
                                    ErrorCode::XPTY0004,
                                    "attribute nodes must precede element content",
                                ));
                            }
                            element.attributes.push(attribute.clone());
                            continue;
                        }
                        if matches!(
                            entry.doc.node(entry.node).content,
                            NodeContent::Namespace { .. }
                        ) {
                            continue;
                        }
                        element
                            .children
                            .push(copy_subtree(&entry.doc, entry.node));
                    }
                }
                XPathVal::Map(_) | XPathVal::Array(_) => {
                    return Err(Error::with_message(
                        ErrorCode::XPTY0004,
                        "maps and arrays cannot appear in element content",
                    ));
                }
                atomic => {
                    let text = atomic.to_string_value();
                    match pending_text.as_mut() {
                        Some(pending) => {
                            pending.push(' ');
                            pending.push_str(&text);
                        }
                        None => pending_text = Some(text),
                    }
                }
            }
        }
        flush(element, &mut pending_text);
        Ok(())
    }

    // ----- computed constructors ---------------------------------------

    fn constructor_name(&mut self, node: &XPathNode) -> Result<String> {
        let name = match &node.name_expression {
            Some(expression) => {
                let value = self.evaluate_node(expression)?;
                value.to_string_value().trim().to_string()
            }
            None => node.value.clone(),
        };
        if !is_qname(&name) {
            return Err(Error::with_message(
                ErrorCode::FOCA0002,
                format!("'{name}' is not a valid QName"),
            ));
        }
        Ok(name)
    }

    fn content_value(&mut self, node: &XPathNode) -> Result<XPathVal> {
        match node.children.first() {
            Some(content) => self.evaluate_node(content),
            None => Ok(XPathVal::Empty),
        }
    }

    pub(crate) fn evaluate_computed_element(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let name = self.constructor_name(node)?;
        let mut element = BuildNode::element(name);
        let content = self.content_value(node)?;
        self.append_content(&mut element, content, true)?;
        Ok(self.freeze_single(element))
    }

    pub(crate) fn evaluate_computed_attribute(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let name = self.constructor_name(node)?;
        let content = self.content_value(node)?;
        let items = content.atomized();
        let mut value = String::new();
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                value.push(' ');
            }
            value.push_str(&item.to_string_value());
        }

        // a standalone attribute node rides on a synthetic owner element
        // until a constructor adopts it
        let mut owner = BuildNode::element(name.clone());
        owner.push_attribute(name, value);
        let order_key = self.next_constructed_order_key();
        let doc = freeze(vec![owner], self.base_uri(), order_key);
        Ok(XPathVal::NodeSet(NodeSet::from_sorted(vec![
            NodeEntry::attribute(doc, 0, 0),
        ])))
    }

    pub(crate) fn evaluate_text_constructor(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let content = self.content_value(node)?;
        let text = atomized_joined(&content);
        Ok(self.freeze_single(BuildNode::text(text)))
    }

    pub(crate) fn evaluate_comment_constructor(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let content = self.content_value(node)?;
        let text = atomized_joined(&content);
        Ok(self.freeze_single(BuildNode::comment(text)))
    }

    pub(crate) fn evaluate_pi_constructor(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let target = match &node.name_expression {
            Some(expression) => {
                let value = self.evaluate_node(expression)?;
                value.to_string_value().trim().to_string()
            }
            None => node.value.clone(),
        };
        if !crate::schema::is_ncname(&target) {
            return Err(Error::with_message(
                ErrorCode::FOCA0002,
                format!("'{target}' is not a valid processing-instruction target"),
            ));
        }
        // the direct form carries its data as literal text content
        let data = match node.children.first() {
            Some(content) if content.kind == NodeKind::TextContent => content.value.clone(),
            Some(content) => atomized_joined(&self.evaluate_node(content)?),
            None => String::new(),
        };
        Ok(self.freeze_single(BuildNode::processing_instruction(target, data)))
    }

    pub(crate) fn evaluate_document_constructor(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let content = self.content_value(node)?;
        // collect top-level nodes through a scratch element
        let mut scratch = BuildNode::element("#document");
        self.append_content(&mut scratch, content, false)?;
        let order_key = self.next_constructed_order_key();
        let doc = freeze(scratch.children, self.base_uri(), order_key);
        let entries = doc
            .roots
            .iter()
            .map(|&id| NodeEntry::element(doc.clone(), id))
            .collect();
        Ok(XPathVal::NodeSet(NodeSet::from_sorted(entries)))
    }
}

fn atomized_joined(value: &XPathVal) -> String {
    let items = value.atomized();
    let mut text = String::new();
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            text.push(' ');
        }
        text.push_str(&item.to_string_value());
    }
    text
}
