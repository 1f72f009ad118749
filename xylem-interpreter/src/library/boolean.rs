// https://www.w3.org/TR/xpath-functions/#boolean-functions

use crate::error::Result;
use crate::eval::Evaluator;
use crate::value::XPathVal;

use super::BuiltinFunction;

fn true_(_eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Boolean(true))
}

fn false_(_eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Boolean(false))
}

fn not(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Boolean(!args[0].to_boolean()))
}

fn boolean(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Boolean(args[0].to_boolean()))
}

fn exists(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Boolean(!args[0].is_empty()))
}

fn empty(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Boolean(args[0].is_empty()))
}

// xml:lang in scope on the context node (or the argument node)
fn lang(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let wanted = args[0].to_string_value().to_ascii_lowercase();
    let entry = match args.get(1) {
        Some(XPathVal::NodeSet(set)) if !set.is_empty() => Some(set.entries[0].clone()),
        _ => eval.context_entry(),
    };
    let Some(entry) = entry else {
        return Ok(XPathVal::Boolean(false));
    };
    let mut current = Some(entry.node);
    while let Some(id) = current {
        if let Some(value) = entry.doc.attribute_value(id, "xml:lang") {
            let value = value.to_ascii_lowercase();
            let matched = value == wanted
                || value
                    .split_once('-')
                    .map(|(primary, _)| primary == wanted)
                    .unwrap_or(false);
            return Ok(XPathVal::Boolean(matched));
        }
        current = entry.doc.node(id).parent;
    }
    Ok(XPathVal::Boolean(false))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("true", 0, 0, true_),
        BuiltinFunction::new("false", 0, 0, false_),
        BuiltinFunction::new("not", 1, 1, not),
        BuiltinFunction::new("boolean", 1, 1, boolean),
        BuiltinFunction::new("exists", 1, 1, exists),
        BuiltinFunction::new("empty", 1, 1, empty),
        BuiltinFunction::new("lang", 1, 2, lang),
    ]
}
