// https://www.w3.org/TR/xpath-functions/#numeric-functions

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::value::{parse_double, XPathVal};

use super::BuiltinFunction;

fn number(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = match args.first() {
        Some(value) => value.to_number(),
        None => eval.context_item_value()?.to_number(),
    };
    Ok(XPathVal::Number(value))
}

fn count(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::Number(args[0].item_count() as f64))
}

fn sum(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let items = args[0].atomized();
    if items.is_empty() {
        return Ok(match args.get(1) {
            Some(zero) => zero.clone(),
            None => XPathVal::Number(0.0),
        });
    }
    let total = items.iter().map(XPathVal::to_number).sum();
    Ok(XPathVal::Number(total))
}

fn avg(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let items = args[0].atomized();
    if items.is_empty() {
        return Ok(XPathVal::Empty);
    }
    let total: f64 = items.iter().map(XPathVal::to_number).sum();
    Ok(XPathVal::Number(total / items.len() as f64))
}

fn floor(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(XPathVal::Number(args[0].to_number().floor()))
}

fn ceiling(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(XPathVal::Number(args[0].to_number().ceil()))
}

// round() rounds .5 toward positive infinity
fn round(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let value = args[0].to_number();
    let precision = args
        .get(1)
        .map(|p| p.to_number())
        .unwrap_or(0.0);
    let scale = 10f64.powi(precision as i32);
    let scaled = value * scale;
    let rounded = (scaled + 0.5).floor();
    Ok(XPathVal::Number(rounded / scale))
}

fn round_half_to_even(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let value = args[0].to_number();
    let precision = args.get(1).map(|p| p.to_number()).unwrap_or(0.0);
    let scale = 10f64.powi(precision as i32);
    let scaled = value * scale;
    let floor = scaled.floor();
    let fraction = scaled - floor;
    let rounded = if (fraction - 0.5).abs() < f64::EPSILON {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    Ok(XPathVal::Number(rounded / scale))
}

fn abs(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(XPathVal::Number(args[0].to_number().abs()))
}

// numeric when every item has a numeric reading, string otherwise
fn extremum(args: &[XPathVal], want_max: bool) -> Result<XPathVal> {
    let items = args[0].atomized();
    if items.is_empty() {
        return Ok(XPathVal::Empty);
    }
    let numbers: Vec<f64> = items
        .iter()
        .map(|item| match item {
            XPathVal::Number(number) => *number,
            other => parse_double(&other.to_string_value()),
        })
        .collect();
    if numbers.iter().all(|number| !number.is_nan()) {
        let result = numbers
            .into_iter()
            .reduce(|a, b| if (b > a) == want_max { b } else { a })
            .expect("non-empty");
        return Ok(XPathVal::Number(result));
    }
    if items
        .iter()
        .any(|item| matches!(item, XPathVal::Number(_)))
    {
        return Err(Error::with_message(
            ErrorCode::FORG0006,
            "cannot compare numbers with non-numeric values",
        ));
    }
    let result = items
        .into_iter()
        .map(|item| item.to_string_value())
        .reduce(|a, b| if (b > a) == want_max { b } else { a })
        .expect("non-empty");
    Ok(XPathVal::String(result))
}

fn min(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    extremum(&args, false)
}

fn max(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    extremum(&args, true)
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("number", 0, 1, number),
        BuiltinFunction::new("count", 1, 1, count),
        BuiltinFunction::new("sum", 1, 2, sum),
        BuiltinFunction::new("avg", 1, 1, avg),
        BuiltinFunction::new("floor", 1, 1, floor),
        BuiltinFunction::new("ceiling", 1, 1, ceiling),
        BuiltinFunction::new("round", 1, 2, round),
        BuiltinFunction::new("round-half-to-even", 1, 2, round_half_to_even),
        BuiltinFunction::new("abs", 1, 1, abs),
        BuiltinFunction::new("min", 1, 2, min),
        BuiltinFunction::new("max", 1, 2, max),
    ]
}
