// https://www.w3.org/TR/xpath-functions/#QName-funcs
//
// QName values travel in lexical form; namespace resolution consults the
// subject node's in-scope declarations and the prolog.

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::schema::is_qname;
use crate::value::XPathVal;
use crate::xml::NodeEntry;

use super::BuiltinFunction;

fn node_argument(args: &[XPathVal], index: usize) -> Option<NodeEntry> {
    match args.get(index) {
        Some(XPathVal::NodeSet(set)) => set.first().cloned(),
        _ => None,
    }
}

fn qname(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let lexical = args[1].to_string_value();
    if !is_qname(lexical.trim()) {
        return Err(Error::with_message(
            ErrorCode::FOCA0002,
            format!("'{lexical}' is not a valid QName"),
        ));
    }
    Ok(XPathVal::String(lexical.trim().to_string()))
}

fn resolve_qname(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let lexical = args[0].to_string_value();
    let lexical = lexical.trim();
    if !is_qname(lexical) {
        return Err(Error::with_message(
            ErrorCode::FOCA0002,
            format!("'{lexical}' is not a valid QName"),
        ));
    }
    if let Some((prefix, _)) = lexical.split_once(':') {
        let element = node_argument(&args, 1).ok_or_else(|| {
            Error::with_message(ErrorCode::FORG0006, "resolve-QName requires an element")
        })?;
        if element.doc.resolve_prefix(element.node, prefix).is_none() {
            return Err(Error::with_message(
                ErrorCode::FONS0004,
                format!("prefix '{prefix}' is not in scope"),
            ));
        }
    }
    Ok(XPathVal::String(lexical.to_string()))
}

fn prefix_from_qname(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let lexical = args[0].to_string_value();
    match lexical.trim().split_once(':') {
        Some((prefix, _)) => Ok(XPathVal::String(prefix.to_string())),
        None => Ok(XPathVal::Empty),
    }
}

fn local_name_from_qname(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let lexical = args[0].to_string_value();
    let lexical = lexical.trim();
    let local = lexical.split_once(':').map(|(_, l)| l).unwrap_or(lexical);
    Ok(XPathVal::String(local.to_string()))
}

fn namespace_uri_from_qname(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let lexical = args[0].to_string_value();
    let Some((prefix, _)) = lexical.trim().split_once(':') else {
        return Ok(XPathVal::String(String::new()));
    };
    // prolog bindings, then the context node's in-scope declarations
    if let Some(uri) = eval.active_prolog().resolve_prefix(prefix) {
        return Ok(XPathVal::String(uri.to_string()));
    }
    if let Some(entry) = eval.context_entry() {
        if let Some(uri) = entry.doc.resolve_prefix(entry.node, prefix) {
            return Ok(XPathVal::String(uri));
        }
    }
    Ok(XPathVal::String(String::new()))
}

fn namespace_uri_for_prefix(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let prefix = args[0].to_string_value();
    let Some(element) = node_argument(&args, 1) else {
        return Ok(XPathVal::Empty);
    };
    match element.doc.resolve_prefix(element.node, &prefix) {
        Some(uri) => Ok(XPathVal::String(uri)),
        None => Ok(XPathVal::Empty),
    }
}

fn in_scope_prefixes(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let Some(element) = node_argument(&args, 0) else {
        return Ok(XPathVal::Empty);
    };
    let prefixes: Vec<XPathVal> = element
        .doc
        .in_scope_namespaces(element.node)
        .into_iter()
        .map(|(prefix, _)| XPathVal::String(prefix))
        .collect();
    Ok(XPathVal::concatenate(prefixes))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("QName", 2, 2, qname),
        BuiltinFunction::new("resolve-QName", 2, 2, resolve_qname),
        BuiltinFunction::new("prefix-from-QName", 1, 1, prefix_from_qname),
        BuiltinFunction::new("local-name-from-QName", 1, 1, local_name_from_qname),
        BuiltinFunction::new("namespace-uri-from-QName", 1, 1, namespace_uri_from_qname),
        BuiltinFunction::new("namespace-uri-for-prefix", 2, 2, namespace_uri_for_prefix),
        BuiltinFunction::new("in-scope-prefixes", 1, 1, in_scope_prefixes),
    ]
}
