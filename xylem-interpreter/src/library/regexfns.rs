// https://www.w3.org/TR/xpath-functions/#string.match
//
// All four functions delegate to the injected regex capability, which is
// loaded lazily on the first call.

use crate::error::Result;
use crate::eval::Evaluator;
use crate::regex::AnalyzedPart;
use crate::value::{NodeSet, XPathVal};
use crate::xml::{freeze, BuildNode, NodeEntry};

use super::BuiltinFunction;

fn flags(args: &[XPathVal], index: usize) -> String {
    args.get(index)
        .map(|value| value.to_string_value())
        .unwrap_or_default()
}

fn matches(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let input = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let flags = flags(&args, 2);
    let engine = eval.regex_engine()?;
    Ok(XPathVal::Boolean(engine.is_match(&pattern, &flags, &input)?))
}

fn replace(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let input = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let replacement = args[2].to_string_value();
    let flags = flags(&args, 3);
    let engine = eval.regex_engine()?;
    Ok(XPathVal::String(engine.replace_all(
        &pattern,
        &flags,
        &input,
        &replacement,
    )?))
}

fn tokenize(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let input = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let flags = flags(&args, 2);
    let engine = eval.regex_engine()?;
    let parts: Vec<XPathVal> = engine
        .split(&pattern, &flags, &input)?
        .into_iter()
        .map(XPathVal::String)
        .collect();
    Ok(XPathVal::concatenate(parts))
}

// `<analyze-string-result>` with `<match>`/`<non-match>` children
fn analyze_string(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let input = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let flags = flags(&args, 2);
    let engine = eval.regex_engine()?;
    let parts = engine.analyze(&pattern, &flags, &input)?;

    let mut result = BuildNode::element("analyze-string-result");
    for part in parts {
        let (name, text) = match part {
            AnalyzedPart::Match(text) => ("match", text),
            AnalyzedPart::NonMatch(text) => ("non-match", text),
        };
        let mut child = BuildNode::element(name);
        child.children.push(BuildNode::text(text));
        result.children.push(child);
    }
    let order_key = eval.next_constructed_order_key();
    let doc = freeze(vec![result], "", order_key);
    Ok(XPathVal::NodeSet(NodeSet::from_sorted(vec![
        NodeEntry::element(doc, 0),
    ])))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("matches", 2, 3, matches),
        BuiltinFunction::new("replace", 3, 4, replace),
        BuiltinFunction::new("tokenize", 2, 3, tokenize),
        BuiltinFunction::new("analyze-string", 2, 3, analyze_string),
    ]
}
