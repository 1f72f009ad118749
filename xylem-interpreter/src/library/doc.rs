// https://www.w3.org/TR/xpath-functions/#fns-on-docs
//
// External fetches go through the host environment; parsed documents are
// cached on the compiled query, unparsed text on the evaluator. Cache
// keys are the resolved URIs.

use crate::compile::resolve_uri;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::value::{NodeSet, XPathVal};
use crate::xml::NodeEntry;

use super::BuiltinFunction;

// loaded documents sort after the primary document, in load order
const LOADED_DOCUMENT_ORDER_BASE: u64 = 1 << 16;

fn resolved_target(eval: &Evaluator, uri: &XPathVal) -> String {
    let base = &eval.active_prolog().static_base_uri;
    resolve_uri(base, &uri.to_string_value())
}

fn load_document(eval: &mut Evaluator, uri: &XPathVal) -> Result<XPathVal> {
    let resolved = resolved_target(eval, uri);
    let document = match eval.compiled.cached_document(&resolved) {
        Some(document) => document,
        None => {
            let order_key = LOADED_DOCUMENT_ORDER_BASE
                + eval
                    .compiled
                    .document_cache
                    .lock()
                    .map(|cache| cache.len() as u64)
                    .unwrap_or(0);
            let document = eval.host.load_document(&resolved, order_key)?;
            eval.compiled.cache_document(&resolved, document.clone());
            document
        }
    };
    let entries: Vec<NodeEntry> = document
        .roots
        .iter()
        .map(|&id| NodeEntry::element(document.clone(), id))
        .collect();
    Ok(XPathVal::NodeSet(NodeSet::from_sorted(entries)))
}

fn doc(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    load_document(eval, &args[0])
}

fn doc_available(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Boolean(false));
    }
    Ok(XPathVal::Boolean(load_document(eval, &args[0]).is_ok()))
}

// no collection catalogue is wired up; the default collection is empty
fn collection(_eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Empty)
}

fn load_text(eval: &mut Evaluator, args: &[XPathVal]) -> Result<String> {
    let resolved = resolved_target(eval, &args[0]);
    if let Some(cached) = eval.text_cache.get(&resolved) {
        return Ok(cached.clone());
    }
    let encoding = args.get(1).map(|encoding| encoding.to_string_value());
    let text = eval.host.load_text(&resolved, encoding.as_deref())?;
    eval.text_cache.insert(resolved, text.clone());
    Ok(text)
}

fn unparsed_text(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(XPathVal::String(load_text(eval, &args)?))
}

fn unparsed_text_lines(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = load_text(eval, &args)?;
    let lines: Vec<XPathVal> = text
        .lines()
        .map(|line| XPathVal::String(line.to_string()))
        .collect();
    Ok(XPathVal::concatenate(lines))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("doc", 1, 1, doc),
        BuiltinFunction::new("doc-available", 1, 1, doc_available),
        BuiltinFunction::new("collection", 0, 1, collection),
        BuiltinFunction::new("unparsed-text", 1, 2, unparsed_text),
        BuiltinFunction::new("unparsed-text-lines", 1, 2, unparsed_text_lines),
    ]
}
