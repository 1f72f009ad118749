// https://www.w3.org/TR/xpath-functions/#string-functions

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::value::XPathVal;

use super::BuiltinFunction;

fn string(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = match args.first() {
        Some(value) => value.to_string_value(),
        None => eval.context_item_value()?.to_string_value(),
    };
    Ok(XPathVal::String(value))
}

fn concat(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let mut out = String::new();
    for arg in &args {
        out.push_str(&arg.to_string_value());
    }
    Ok(XPathVal::String(out))
}

// XPath substring positions are 1-based and rounded
fn substring(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let source: Vec<char> = args[0].to_string_value().chars().collect();
    let start = args[1].to_number();
    if start.is_nan() {
        return Ok(XPathVal::String(String::new()));
    }
    let start = (start + 0.5).floor();
    let end = match args.get(2) {
        Some(length) => {
            let length = length.to_number();
            if length.is_nan() {
                return Ok(XPathVal::String(String::new()));
            }
            start + (length + 0.5).floor()
        }
        None => f64::INFINITY,
    };
    let result: String = source
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            let position = (*index + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, ch)| *ch)
        .collect();
    Ok(XPathVal::String(result))
}

fn contains(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    // map:contains shares the local name; dispatch on the argument type
    if let XPathVal::Map(map) = &args[0] {
        return super::maps::map_contains(map, &args[1]);
    }
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    Ok(XPathVal::Boolean(haystack.contains(&needle)))
}

fn starts_with(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    Ok(XPathVal::Boolean(haystack.starts_with(&needle)))
}

fn ends_with(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    Ok(XPathVal::Boolean(haystack.ends_with(&needle)))
}

fn substring_before(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    let result = haystack
        .find(&needle)
        .map(|index| haystack[..index].to_string())
        .unwrap_or_default();
    Ok(XPathVal::String(result))
}

fn substring_after(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    let result = haystack
        .find(&needle)
        .map(|index| haystack[index + needle.len()..].to_string())
        .unwrap_or_default();
    Ok(XPathVal::String(result))
}

fn string_length(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = match args.first() {
        Some(value) => value.to_string_value(),
        None => eval.context_item_value()?.to_string_value(),
    };
    Ok(XPathVal::Number(value.chars().count() as f64))
}

fn normalize_space(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = match args.first() {
        Some(value) => value.to_string_value(),
        None => eval.context_item_value()?.to_string_value(),
    };
    let collapsed: Vec<&str> = value.split_whitespace().collect();
    Ok(XPathVal::String(collapsed.join(" ")))
}

// Unicode normalisation forms are not applied; the value passes through
// in its original form.
fn normalize_unicode(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::String(args[0].to_string_value()))
}

fn upper_case(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::String(args[0].to_string_value().to_uppercase()))
}

fn lower_case(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::String(args[0].to_string_value().to_lowercase()))
}

fn translate(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let source = args[0].to_string_value();
    let from: Vec<char> = args[1].to_string_value().chars().collect();
    let to: Vec<char> = args[2].to_string_value().chars().collect();
    let mut result = String::with_capacity(source.len());
    for ch in source.chars() {
        match from.iter().position(|&candidate| candidate == ch) {
            Some(index) => {
                if let Some(&replacement) = to.get(index) {
                    result.push(replacement);
                }
                // chars beyond the replacement list are removed
            }
            None => result.push(ch),
        }
    }
    Ok(XPathVal::String(result))
}

fn string_join(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let separator = args
        .get(1)
        .map(|sep| sep.to_string_value())
        .unwrap_or_default();
    let parts: Vec<String> = args[0]
        .atomized()
        .iter()
        .map(XPathVal::to_string_value)
        .collect();
    Ok(XPathVal::String(parts.join(&separator)))
}

fn codepoints_to_string(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let mut result = String::new();
    for item in args[0].atomized() {
        let code = item.to_number();
        let valid = code.fract() == 0.0 && (1.0..=u32::MAX as f64).contains(&code);
        match char::from_u32(code as u32).filter(|_| valid) {
            Some(ch) => result.push(ch),
            None => {
                return Err(Error::with_message(
                    ErrorCode::FORG0001,
                    format!("{code} is not a valid codepoint"),
                ))
            }
        }
    }
    Ok(XPathVal::String(result))
}

fn string_to_codepoints(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = args[0].to_string_value();
    if value.is_empty() {
        return Ok(XPathVal::Empty);
    }
    let items: Vec<XPathVal> = value
        .chars()
        .map(|ch| XPathVal::Number(ch as u32 as f64))
        .collect();
    Ok(XPathVal::concatenate(items))
}

fn codepoint_equal(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() || args[1].is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(XPathVal::Boolean(
        args[0].to_string_value() == args[1].to_string_value(),
    ))
}

fn compare(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() || args[1].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let left = args[0].to_string_value();
    let right = args[1].to_string_value();
    let ordering = match left.cmp(&right) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    };
    Ok(XPathVal::Number(ordering))
}

fn is_uri_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

fn percent_encode(input: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut result = String::with_capacity(input.len());
    for byte in input.bytes() {
        if keep(byte) {
            result.push(byte as char);
        } else {
            result.push_str(&format!("%{byte:02X}"));
        }
    }
    result
}

fn encode_for_uri(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::String(percent_encode(
        &args[0].to_string_value(),
        is_uri_unreserved,
    )))
}

fn escape_html_uri(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::String(percent_encode(
        &args[0].to_string_value(),
        |byte| (0x20..0x7f).contains(&byte),
    )))
}

fn iri_to_uri(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    Ok(XPathVal::String(percent_encode(
        &args[0].to_string_value(),
        |byte| (0x21..0x7f).contains(&byte) && byte != b'<' && byte != b'>' && byte != b'"',
    )))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("string", 0, 1, string),
        BuiltinFunction::new("concat", 2, 64, concat),
        BuiltinFunction::new("substring", 2, 3, substring),
        BuiltinFunction::new("contains", 2, 3, contains),
        BuiltinFunction::new("starts-with", 2, 3, starts_with),
        BuiltinFunction::new("ends-with", 2, 3, ends_with),
        BuiltinFunction::new("substring-before", 2, 3, substring_before),
        BuiltinFunction::new("substring-after", 2, 3, substring_after),
        BuiltinFunction::new("string-length", 0, 1, string_length),
        BuiltinFunction::new("normalize-space", 0, 1, normalize_space),
        BuiltinFunction::new("normalize-unicode", 1, 2, normalize_unicode),
        BuiltinFunction::new("upper-case", 1, 1, upper_case),
        BuiltinFunction::new("lower-case", 1, 1, lower_case),
        BuiltinFunction::new("translate", 3, 3, translate),
        BuiltinFunction::new("string-join", 1, 2, string_join),
        BuiltinFunction::new("codepoints-to-string", 1, 1, codepoints_to_string),
        BuiltinFunction::new("string-to-codepoints", 1, 1, string_to_codepoints),
        BuiltinFunction::new("codepoint-equal", 2, 2, codepoint_equal),
        BuiltinFunction::new("compare", 2, 3, compare),
        BuiltinFunction::new("encode-for-uri", 1, 1, encode_for_uri),
        BuiltinFunction::new("escape-html-uri", 1, 1, escape_html_uri),
        BuiltinFunction::new("iri-to-uri", 1, 1, iri_to_uri),
    ]
}
