//! Path expression evaluation: step-by-step context expansion through
//! the axis evaluator, node tests, predicates, and document-order
//! normalisation of the result.

use xylem_xquery_ast::{NodeKind, XPathNode};

use crate::axis::Axis;
use crate::context::EvalContext;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::{Evaluator, PredicateResult};
use crate::value::{NodeSet, XPathVal};
use crate::xml::{NodeContent, NodeEntry};

// the step context is either real node entries or the virtual document
// node a leading `/` starts from
enum StepContext {
    Document,
    Entries(Vec<NodeEntry>),
}

impl<'a> Evaluator<'a> {
    pub(crate) fn evaluate_path(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let steps: &[XPathNode] = match node.kind {
            NodeKind::Step => std::slice::from_ref(node),
            _ => &node.children,
        };

        let mut index = 0;
        let mut context = match steps.first().map(|step| step.kind) {
            Some(NodeKind::Root) => {
                index = 1;
                StepContext::Document
            }
            Some(NodeKind::Step) | None => match self.context_entry() {
                Some(entry) => StepContext::Entries(vec![entry]),
                None => return Err(Error::new(ErrorCode::XPDY0002)),
            },
            // a leading primary (`$var/a`, `doc(…)//x`) provides its own
            // initial node-set and needs no context item
            Some(_) => {
                index = 1;
                let value = self.evaluate_node(&steps[0])?;
                if steps.len() == 1 {
                    return Ok(value);
                }
                match value {
                    XPathVal::Empty => StepContext::Entries(Vec::new()),
                    XPathVal::NodeSet(set) => StepContext::Entries(set.entries),
                    _ => {
                        return Err(Error::with_message(
                            ErrorCode::XPTY0019,
                            "an intermediate path step must produce nodes",
                        ))
                    }
                }
            }
        };

        while index < steps.len() {
            let step = &steps[index];
            let is_last = index == steps.len() - 1;
            match step.kind {
                NodeKind::Step => {
                    let entries = self.apply_axis_step(step, &context)?;
                    context = StepContext::Entries(entries);
                }
                _ => {
                    let value = self.apply_expression_step(step, &context)?;
                    if is_last {
                        return Ok(value);
                    }
                    match value {
                        XPathVal::Empty => {
                            context = StepContext::Entries(Vec::new());
                        }
                        XPathVal::NodeSet(set) => {
                            context = StepContext::Entries(set.entries);
                        }
                        _ => {
                            return Err(Error::with_message(
                                ErrorCode::XPTY0019,
                                "an intermediate path step must produce nodes",
                            ))
                        }
                    }
                }
            }
            index += 1;
        }

        match context {
            StepContext::Document => {
                // a bare `/` selects the document roots
                let Some(document) = self.document.clone() else {
                    return Err(Error::new(ErrorCode::XPDY0002));
                };
                let entries = document
                    .roots
                    .iter()
                    .map(|&id| NodeEntry::element(document.clone(), id))
                    .collect();
                Ok(XPathVal::NodeSet(NodeSet::from_sorted(entries)))
            }
            StepContext::Entries(entries) => Ok(XPathVal::NodeSet(NodeSet::new(entries))),
        }
    }

    // One axis step over every context entry; matches are filtered by the
    // node test, then by each predicate with positional context, then the
    // union is normalised to document order.
    fn apply_axis_step(&mut self, step: &XPathNode, context: &StepContext) -> Result<Vec<NodeEntry>> {
        let axis_name = &step.children[0].value;
        let Some(axis) = Axis::parse(axis_name) else {
            return Err(Error::with_message(
                ErrorCode::XPST0003,
                format!("unknown axis '{axis_name}'"),
            ));
        };
        let test = &step.children[1];
        let predicates = &step.children[2..];

        let mut output = self.arena.node_entries.acquire(16);
        let step_result = self.collect_step_matches(context, test, axis, predicates, &mut output);
        if let Err(error) = step_result {
            self.arena.node_entries.release(output);
            return Err(error);
        }

        // normalise in the pooled buffer, then hand back an exact-size copy
        output.sort_by_key(NodeEntry::order_key);
        output.dedup_by(|a, b| a.order_key() == b.order_key());
        let entries = output.clone();
        self.arena.node_entries.release(output);
        Ok(entries)
    }

    fn collect_step_matches(
        &mut self,
        context: &StepContext,
        test: &XPathNode,
        axis: Axis,
        predicates: &[XPathNode],
        output: &mut Vec<NodeEntry>,
    ) -> Result<()> {
        match context {
            StepContext::Document => {
                let candidates = self.expand_from_document(axis)?;
                let matched = self.filter_step_candidates(&candidates, test, axis, predicates)?;
                output.extend(matched);
            }
            StepContext::Entries(entries) => {
                for entry in entries {
                    let estimate = self.axis.estimate_result_size(axis, entry);
                    let mut buffer = self.arena.node_entries.acquire(estimate);
                    self.axis.evaluate_axis(axis, entry, &mut buffer);
                    let matched = self.filter_step_candidates(&buffer, test, axis, predicates);
                    self.arena.node_entries.release(buffer);
                    output.extend(matched?);
                }
            }
        }
        Ok(())
    }

    // node test, then predicates left to right; position counts in axis
    // order within one context entry's matches
    fn filter_step_candidates(
        &mut self,
        candidates: &[NodeEntry],
        test: &XPathNode,
        axis: Axis,
        predicates: &[XPathNode],
    ) -> Result<Vec<NodeEntry>> {
        let mut matched = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.match_node_test(test, axis, candidate)? {
                matched.push(candidate.clone());
            }
        }
        for predicate in predicates {
            let size = matched.len();
            let mut kept = Vec::with_capacity(size);
            for (index, entry) in matched.into_iter().enumerate() {
                let result = self.evaluate_predicate_for_entry(
                    &predicate.children[0],
                    &entry,
                    index + 1,
                    size,
                )?;
                if result == PredicateResult::Match {
                    kept.push(entry);
                }
            }
            matched = kept;
        }
        Ok(matched)
    }

    pub(crate) fn evaluate_predicate_for_entry(
        &mut self,
        predicate: &XPathNode,
        entry: &NodeEntry,
        position: usize,
        size: usize,
    ) -> Result<PredicateResult> {
        let mut frame = EvalContext::with_item(entry.clone());
        frame.position = position;
        frame.size = size;
        self.context.push(frame);
        let outcome = self.evaluate_node(predicate);
        self.context.pop();
        self.interpret_predicate_value(outcome, position)
    }

    // expression steps (`book/string()`, `a/(b | c)`) evaluate per entry
    // with positional context and concatenate in order
    fn apply_expression_step(
        &mut self,
        step: &XPathNode,
        context: &StepContext,
    ) -> Result<XPathVal> {
        let entries = match context {
            StepContext::Document => {
                let Some(document) = self.document.clone() else {
                    return Err(Error::new(ErrorCode::XPDY0002));
                };
                document
                    .roots
                    .iter()
                    .map(|&id| NodeEntry::element(document.clone(), id))
                    .collect()
            }
            StepContext::Entries(entries) => entries.clone(),
        };

        let size = entries.len();
        let mut values = Vec::with_capacity(size);
        let mut saw_nodes = false;
        let mut saw_atomics = false;
        for (index, entry) in entries.into_iter().enumerate() {
            let mut frame = EvalContext::with_item(entry);
            frame.position = index + 1;
            frame.size = size;
            self.context.push(frame);
            let value = self.evaluate_node(step);
            self.context.pop();
            let value = value?;
            match &value {
                XPathVal::Empty => {}
                XPathVal::NodeSet(_) => saw_nodes = true,
                _ => saw_atomics = true,
            }
            values.push(value);
        }
        if saw_nodes && saw_atomics {
            return Err(Error::with_message(
                ErrorCode::XPTY0018,
                "a path step produced both nodes and atomic values",
            ));
        }
        Ok(XPathVal::concatenate(values))
    }

    // axes from the virtual document node of an absolute path
    fn expand_from_document(&mut self, axis: Axis) -> Result<Vec<NodeEntry>> {
        let Some(document) = self.document.clone() else {
            return Err(Error::new(ErrorCode::XPDY0002));
        };
        let mut output = Vec::new();
        match axis {
            Axis::Child => {
                for &root in &document.roots {
                    output.push(NodeEntry::element(document.clone(), root));
                }
            }
            Axis::Descendant | Axis::DescendantOrSelf => {
                for id in 0..document.nodes.len() {
                    output.push(NodeEntry::element(document.clone(), id));
                }
            }
            // attribute/self/parent/sibling axes from the document node
            // have no members in this model
            _ => {}
        }
        Ok(output)
    }

    /// Node test matching. The principal node kind follows the axis:
    /// attributes on the attribute axis, namespace nodes on the namespace
    /// axis, elements elsewhere.
    pub(crate) fn match_node_test(
        &mut self,
        test: &XPathNode,
        axis: Axis,
        candidate: &NodeEntry,
    ) -> Result<bool> {
        match test.kind {
            NodeKind::NameTest => self.match_name_test(&test.value, axis, candidate),
            NodeKind::KindTest => Ok(self.match_kind_test(test, candidate)),
            _ => Ok(false),
        }
    }

    fn match_name_test(&mut self, name: &str, axis: Axis, candidate: &NodeEntry) -> Result<bool> {
        match axis {
            Axis::Attribute => {
                let Some(attribute) = candidate.attribute_record() else {
                    return Ok(false);
                };
                Ok(self.name_matches(name, attribute.local_name(), || {
                    let prefix = attribute.prefix().to_string();
                    if prefix.is_empty() {
                        None
                    } else {
                        candidate.doc.resolve_prefix(candidate.node, &prefix)
                    }
                })?)
            }
            Axis::Namespace => {
                let NodeContent::Namespace { prefix, .. } =
                    &candidate.doc.node(candidate.node).content
                else {
                    return Ok(false);
                };
                Ok(name == "*" || name == prefix)
            }
            _ => {
                if candidate.is_attribute() {
                    return Ok(false);
                }
                let record = candidate.doc.node(candidate.node);
                if !record.is_element() {
                    return Ok(false);
                }
                let local = candidate.doc.local_name(candidate.node).to_string();
                let doc = candidate.doc.clone();
                let node = candidate.node;
                Ok(self.name_matches(name, &local, || doc.namespace_uri(node))?)
            }
        }
    }

    // Name comparison: `*` matches anything of the principal kind,
    // `prefix:*` matches by namespace, a prefixed name compares both
    // parts, and an unprefixed name compares local names (the default
    // element namespace, when declared, is honoured).
    fn name_matches(
        &mut self,
        test: &str,
        candidate_local: &str,
        candidate_uri: impl FnOnce() -> Option<String>,
    ) -> Result<bool> {
        if test == "*" {
            return Ok(true);
        }
        if let Some((prefix, local)) = test.split_once(':') {
            let Some(uri) = self.resolve_test_prefix(prefix) else {
                return Err(Error::with_message(
                    ErrorCode::FONS0004,
                    format!("undeclared namespace prefix '{prefix}'"),
                ));
            };
            if local != "*" && local != candidate_local {
                return Ok(false);
            }
            return Ok(candidate_uri().as_deref() == Some(uri.as_str()));
        }
        if test != candidate_local {
            return Ok(false);
        }
        if let Some(default_ns) = &self.active_prolog().default_element_namespace {
            return Ok(candidate_uri().as_deref() == Some(default_ns.as_str()));
        }
        Ok(true)
    }

    // prolog bindings first, then the context document's root-element
    // in-scope declarations
    fn resolve_test_prefix(&self, prefix: &str) -> Option<String> {
        if let Some(uri) = self.active_prolog().resolve_prefix(prefix) {
            return Some(uri.to_string());
        }
        let document = self.document.as_ref()?;
        let root = document
            .roots
            .iter()
            .copied()
            .find(|&id| document.node(id).is_element())?;
        document.resolve_prefix(root, prefix)
    }

    fn match_kind_test(&self, test: &XPathNode, candidate: &NodeEntry) -> bool {
        let name_argument = test.children.first().map(|child| child.value.as_str());
        let content = &candidate.doc.node(candidate.node).content;
        match test.value.as_str() {
            "node" => true,
            "text" => {
                !candidate.is_attribute() && matches!(content, NodeContent::Text(_))
            }
            "comment" => {
                !candidate.is_attribute() && matches!(content, NodeContent::Comment(_))
            }
            "processing-instruction" => {
                !candidate.is_attribute()
                    && match content {
                        NodeContent::ProcessingInstruction { target, .. } => name_argument
                            .map(|wanted| wanted == "*" || wanted == target)
                            .unwrap_or(true),
                        _ => false,
                    }
            }
            "element" | "schema-element" => {
                !candidate.is_attribute()
                    && matches!(content, NodeContent::Element { .. })
                    && name_argument
                        .map(|wanted| {
                            wanted == "*" || wanted == candidate.doc.local_name(candidate.node)
                        })
                        .unwrap_or(true)
            }
            "attribute" | "schema-attribute" => match candidate.attribute_record() {
                Some(attribute) => name_argument
                    .map(|wanted| wanted == "*" || wanted == attribute.local_name())
                    .unwrap_or(true),
                None => false,
            },
            "document-node" => {
                !candidate.is_attribute()
                    && candidate.doc.node(candidate.node).parent.is_none()
            }
            _ => false,
        }
    }
}
