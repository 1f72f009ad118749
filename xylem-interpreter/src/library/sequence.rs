// https://www.w3.org/TR/xpath-functions/#general-seq-funcs

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::value::{MapKey, XPathVal};
use crate::xml::serialize_entry;

use super::BuiltinFunction;

fn position(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Number(eval.context_position() as f64))
}

fn last(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Number(eval.context_size() as f64))
}

fn data(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = match args.first() {
        Some(value) => value.clone(),
        None => eval.context_item_value()?,
    };
    Ok(XPathVal::concatenate(value.atomized()))
}

fn distinct_values(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let mut seen: Vec<MapKey> = Vec::new();
    let mut kept = Vec::new();
    for item in args[0].atomized() {
        let Some(key) = MapKey::from_value(&item) else {
            continue;
        };
        if !seen.contains(&key) {
            seen.push(key);
            kept.push(item);
        }
    }
    Ok(XPathVal::concatenate(kept))
}

fn items_equal(left: &XPathVal, right: &XPathVal) -> bool {
    let numeric =
        matches!(left, XPathVal::Number(_)) || matches!(right, XPathVal::Number(_));
    if numeric {
        return left.to_number() == right.to_number();
    }
    left.to_string_value() == right.to_string_value()
}

fn index_of(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let needle_items = args[1].atomized();
    let Some(needle) = needle_items.first() else {
        return Ok(XPathVal::Empty);
    };
    let positions: Vec<XPathVal> = args[0]
        .atomized()
        .iter()
        .enumerate()
        .filter(|(_, item)| items_equal(item, needle))
        .map(|(index, _)| XPathVal::Number((index + 1) as f64))
        .collect();
    Ok(XPathVal::concatenate(positions))
}

fn insert_before(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let target = args[0].items();
    let position = args[1].to_number().max(1.0) as usize;
    let inserts = args[2].items();
    let index = (position - 1).min(target.len());
    let mut result = Vec::with_capacity(target.len() + inserts.len());
    result.extend(target[..index].iter().cloned());
    result.extend(inserts);
    result.extend(target[index..].iter().cloned());
    Ok(XPathVal::concatenate(result))
}

fn remove(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let position = args[1].to_number();
    let items: Vec<XPathVal> = args[0]
        .items()
        .into_iter()
        .enumerate()
        .filter(|(index, _)| (index + 1) as f64 != position)
        .map(|(_, item)| item)
        .collect();
    Ok(XPathVal::concatenate(items))
}

fn reverse(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let mut items = args[0].items();
    items.reverse();
    match items.len() {
        0 => Ok(XPathVal::Empty),
        1 => Ok(items.into_iter().next().unwrap()),
        _ => Ok(XPathVal::Sequence(items)),
    }
}

fn subsequence(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let items = args[0].items();
    let start = (args[1].to_number() + 0.5).floor();
    let end = match args.get(2) {
        Some(length) => start + (length.to_number() + 0.5).floor(),
        None => f64::INFINITY,
    };
    let kept: Vec<XPathVal> = items
        .into_iter()
        .enumerate()
        .filter(|(index, _)| {
            let position = (index + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, item)| item)
        .collect();
    Ok(XPathVal::concatenate(kept))
}

// `unordered` releases ordering constraints; this engine keeps the input
// order, which is a valid ordering
fn unordered(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(args[0].clone())
}

fn deep_equal_items(left: &XPathVal, right: &XPathVal) -> bool {
    match (left, right) {
        (XPathVal::NodeSet(a), XPathVal::NodeSet(b)) => {
            a.len() == b.len()
                && a.entries
                    .iter()
                    .zip(b.entries.iter())
                    .all(|(x, y)| serialize_entry(x) == serialize_entry(y))
        }
        _ => items_equal(left, right),
    }
}

fn deep_equal(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let left = args[0].items();
    let right = args[1].items();
    if left.len() != right.len() {
        return Ok(XPathVal::Boolean(false));
    }
    let equal = left
        .iter()
        .zip(right.iter())
        .all(|(a, b)| deep_equal_items(a, b));
    Ok(XPathVal::Boolean(equal))
}

fn zero_or_one(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].item_count() > 1 {
        return Err(Error::with_message(
            ErrorCode::FORG0003,
            "zero-or-one called with a sequence of more than one item",
        ));
    }
    Ok(args[0].clone())
}

fn one_or_more(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].item_count() == 0 {
        return Err(Error::with_message(
            ErrorCode::FORG0004,
            "one-or-more called with an empty sequence",
        ));
    }
    Ok(args[0].clone())
}

fn exactly_one(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].item_count() != 1 {
        return Err(Error::with_message(
            ErrorCode::FORG0005,
            "exactly-one called with a sequence of zero or several items",
        ));
    }
    Ok(args[0].clone())
}

fn error(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let description = match args.len() {
        0 => "error signalled by fn:error()".to_string(),
        1 => args[0].to_string_value(),
        _ => format!("{}: {}", args[0].to_string_value(), args[1].to_string_value()),
    };
    Err(Error::with_message(ErrorCode::FOER0000, description))
}

fn trace(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let label = args
        .get(1)
        .map(|label| label.to_string_value())
        .unwrap_or_else(|| "trace".to_string());
    eval.record_warning(format!("{label}: {}", args[0].to_output_string()));
    Ok(args[0].clone())
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("position", 0, 0, position),
        BuiltinFunction::new("last", 0, 0, last),
        BuiltinFunction::new("data", 0, 1, data),
        BuiltinFunction::new("distinct-values", 1, 2, distinct_values),
        BuiltinFunction::new("index-of", 2, 3, index_of),
        BuiltinFunction::new("insert-before", 3, 3, insert_before),
        BuiltinFunction::new("remove", 2, 2, remove),
        BuiltinFunction::new("reverse", 1, 1, reverse),
        BuiltinFunction::new("subsequence", 2, 3, subsequence),
        BuiltinFunction::new("unordered", 1, 1, unordered),
        BuiltinFunction::new("deep-equal", 2, 3, deep_equal),
        BuiltinFunction::new("zero-or-one", 1, 1, zero_or_one),
        BuiltinFunction::new("one-or-more", 1, 1, one_or_more),
        BuiltinFunction::new("exactly-one", 1, 1, exactly_one),
        BuiltinFunction::new("error", 0, 3, error),
        BuiltinFunction::new("trace", 1, 2, trace),
    ]
}
