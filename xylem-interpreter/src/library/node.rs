// https://www.w3.org/TR/xpath-functions/#node-functions

use crate::error::Result;
use crate::eval::Evaluator;
use crate::value::{NodeSet, XPathVal};
use crate::xml::NodeEntry;

use super::BuiltinFunction;

// argument node, or the context node for the zero-argument form
fn subject_entry(eval: &mut Evaluator, args: &[XPathVal]) -> Result<Option<NodeEntry>> {
    match args.first() {
        Some(XPathVal::NodeSet(set)) => Ok(set.first().cloned()),
        Some(XPathVal::Empty) => Ok(None),
        Some(_) => Ok(None),
        None => Ok(eval.context_entry()),
    }
}

fn name(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = subject_entry(eval, &args)?
        .map(|entry| entry.name())
        .unwrap_or_default();
    Ok(XPathVal::String(value))
}

fn local_name(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = subject_entry(eval, &args)?
        .map(|entry| entry.local_name())
        .unwrap_or_default();
    Ok(XPathVal::String(value))
}

fn node_name(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    match subject_entry(eval, &args)? {
        Some(entry) => {
            let name = entry.name();
            if name.is_empty() {
                Ok(XPathVal::Empty)
            } else {
                Ok(XPathVal::String(name))
            }
        }
        None => Ok(XPathVal::Empty),
    }
}

fn namespace_uri(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let Some(entry) = subject_entry(eval, &args)? else {
        return Ok(XPathVal::String(String::new()));
    };
    let uri = if let Some(attribute) = entry.attribute_record() {
        let prefix = attribute.prefix().to_string();
        if prefix.is_empty() {
            None
        } else {
            entry.doc.resolve_prefix(entry.node, &prefix)
        }
    } else {
        entry.doc.namespace_uri(entry.node)
    };
    Ok(XPathVal::String(uri.unwrap_or_default()))
}

fn root(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let Some(entry) = subject_entry(eval, &args)? else {
        return Ok(XPathVal::Empty);
    };
    let mut current = entry.node;
    while let Some(parent) = entry.doc.node(current).parent {
        current = parent;
    }
    Ok(XPathVal::NodeSet(NodeSet::from_sorted(vec![
        NodeEntry::element(entry.doc, current),
    ])))
}

fn base_uri(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    match subject_entry(eval, &args)? {
        Some(entry) if !entry.doc.base_uri.is_empty() => {
            Ok(XPathVal::String(entry.doc.base_uri.clone()))
        }
        _ => Ok(XPathVal::Empty),
    }
}

fn document_uri(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    match subject_entry(eval, &args)? {
        Some(entry)
            if entry.doc.node(entry.node).parent.is_none()
                && !entry.is_attribute()
                && !entry.doc.base_uri.is_empty() =>
        {
            Ok(XPathVal::String(entry.doc.base_uri.clone()))
        }
        _ => Ok(XPathVal::Empty),
    }
}

// elements carrying an `id` or `xml:id` attribute equal to one of the
// requested tokens, in document order
fn id(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let mut wanted: Vec<String> = Vec::new();
    for item in args[0].atomized() {
        for token in item.to_string_value().split_whitespace() {
            wanted.push(token.to_string());
        }
    }
    let entry = match args.get(1) {
        Some(XPathVal::NodeSet(set)) => set.first().cloned(),
        _ => eval.context_entry(),
    };
    let Some(entry) = entry else {
        return Ok(XPathVal::Empty);
    };
    let mut matches = Vec::new();
    for id in 0..entry.doc.nodes.len() {
        if !entry.doc.node(id).is_element() {
            continue;
        }
        let identifier = entry
            .doc
            .attribute_value(id, "xml:id")
            .or_else(|| entry.doc.attribute_value(id, "id"));
        if let Some(identifier) = identifier {
            if wanted.iter().any(|token| token == identifier) {
                matches.push(NodeEntry::element(entry.doc.clone(), id));
            }
        }
    }
    Ok(XPathVal::NodeSet(NodeSet::from_sorted(matches)))
}

// elements whose `idref`/`idrefs` attribute mentions one of the ids
fn idref(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let mut wanted: Vec<String> = Vec::new();
    for item in args[0].atomized() {
        for token in item.to_string_value().split_whitespace() {
            wanted.push(token.to_string());
        }
    }
    let entry = match args.get(1) {
        Some(XPathVal::NodeSet(set)) => set.first().cloned(),
        _ => eval.context_entry(),
    };
    let Some(entry) = entry else {
        return Ok(XPathVal::Empty);
    };
    let mut matches = Vec::new();
    for id in 0..entry.doc.nodes.len() {
        for (index, attribute) in entry.doc.node(id).attributes.iter().enumerate() {
            let local = attribute.local_name();
            if local != "idref" && local != "idrefs" {
                continue;
            }
            if attribute
                .value
                .split_whitespace()
                .any(|token| wanted.iter().any(|want| want == token))
            {
                matches.push(NodeEntry::attribute(entry.doc.clone(), id, index));
            }
        }
    }
    Ok(XPathVal::NodeSet(NodeSet::from_sorted(matches)))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("name", 0, 1, name),
        BuiltinFunction::new("local-name", 0, 1, local_name),
        BuiltinFunction::new("node-name", 0, 1, node_name),
        BuiltinFunction::new("namespace-uri", 0, 1, namespace_uri),
        BuiltinFunction::new("root", 0, 1, root),
        BuiltinFunction::new("base-uri", 0, 1, base_uri),
        BuiltinFunction::new("document-uri", 0, 1, document_uri),
        BuiltinFunction::new("id", 1, 2, id),
        BuiltinFunction::new("idref", 1, 2, idref),
    ]
}
