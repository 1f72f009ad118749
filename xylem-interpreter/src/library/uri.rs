// https://www.w3.org/TR/xpath-functions/#uri-funcs

use crate::compile::resolve_uri;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::value::XPathVal;

use super::BuiltinFunction;

pub(crate) const CODEPOINT_COLLATION: &str =
    "http://www.w3.org/2005/xpath-functions/collation/codepoint";

fn resolve_uri_fn(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let relative = args[0].to_string_value();
    let base = match args.get(1) {
        Some(base) => base.to_string_value(),
        None => eval.active_prolog().static_base_uri.clone(),
    };
    Ok(XPathVal::String(resolve_uri(&base, &relative)))
}

fn static_base_uri(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    let base = &eval.active_prolog().static_base_uri;
    if base.is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(XPathVal::String(base.clone()))
}

fn default_collation(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    let collation = &eval.active_prolog().default_collation;
    if collation.is_empty() {
        return Ok(XPathVal::String(CODEPOINT_COLLATION.to_string()));
    }
    Ok(XPathVal::String(collation.clone()))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("resolve-uri", 1, 2, resolve_uri_fn),
        BuiltinFunction::new("static-base-uri", 0, 0, static_base_uri),
        BuiltinFunction::new("default-collation", 0, 0, default_collation),
    ]
}
