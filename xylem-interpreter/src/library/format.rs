// Formatting functions: format-number with prolog decimal formats,
// format-integer, and picture-string formatting for dates and times.

use chrono::{Datelike, Timelike};

use xylem_xquery_ast::DecimalFormat;

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::schema::{parse_date, parse_date_time, parse_time};
use crate::value::XPathVal;

use super::BuiltinFunction;

// ----- format-number ---------------------------------------------------

// a `#,##0.00`-style picture against a decimal-format record
fn apply_number_picture(value: f64, picture: &str, format: &DecimalFormat) -> Result<String> {
    if value.is_nan() {
        return Ok(format.nan.clone());
    }
    let negative = value < 0.0 || (value == 0.0 && value.is_sign_negative());
    let magnitude = value.abs();
    if magnitude.is_infinite() {
        let mut out = String::new();
        if negative {
            out.push_str(&format.minus_sign);
        }
        out.push_str(&format.infinity);
        return Ok(out);
    }

    let percent = picture.contains(&format.percent);
    let per_mille = picture.contains(&format.per_mille);
    let scaled = if percent {
        magnitude * 100.0
    } else if per_mille {
        magnitude * 1000.0
    } else {
        magnitude
    };

    // split the (first sub-)picture into integer and fraction parts
    let sub_picture = picture
        .split(&format.pattern_separator)
        .next()
        .unwrap_or(picture);
    let (integer_picture, fraction_picture) =
        match sub_picture.split_once(&format.decimal_separator) {
            Some((integer_part, fraction_part)) => (integer_part, fraction_part),
            None => (sub_picture, ""),
        };

    let min_integer_digits = integer_picture
        .chars()
        .filter(|ch| ch.to_string() == format.zero_digit)
        .count()
        .max(1);
    let min_fraction_digits = fraction_picture
        .chars()
        .filter(|ch| ch.to_string() == format.zero_digit)
        .count();
    let max_fraction_digits = fraction_picture
        .chars()
        .filter(|ch| ch.to_string() == format.zero_digit || ch.to_string() == format.digit)
        .count();

    // grouping interval from the position of the grouping separator
    let grouping = integer_picture
        .rfind(&format.grouping_separator)
        .map(|index| integer_picture.len() - index - format.grouping_separator.len());

    let rounded = {
        let scale = 10f64.powi(max_fraction_digits as i32);
        (scaled * scale).round() / scale
    };
    let mut integer_digits = format!("{}", rounded.trunc() as u64);
    while integer_digits.len() < min_integer_digits {
        integer_digits.insert(0, '0');
    }
    if format.zero_digit != "0" {
        integer_digits = remap_digits(&integer_digits, &format.zero_digit);
    }

    let mut grouped = String::new();
    if let Some(interval) = grouping.filter(|&interval| interval > 0) {
        let chars: Vec<char> = integer_digits.chars().collect();
        for (index, ch) in chars.iter().enumerate() {
            if index > 0 && (chars.len() - index) % interval == 0 {
                grouped.push_str(&format.grouping_separator);
            }
            grouped.push(*ch);
        }
    } else {
        grouped = integer_digits;
    }

    let mut out = String::new();
    if negative {
        out.push_str(&format.minus_sign);
    }
    out.push_str(&grouped);

    if max_fraction_digits > 0 {
        let fraction = rounded.fract();
        let mut digits = format!(
            "{:0width$}",
            (fraction * 10f64.powi(max_fraction_digits as i32)).round() as u64,
            width = max_fraction_digits
        );
        while digits.len() > min_fraction_digits && digits.ends_with('0') {
            digits.pop();
        }
        if !digits.is_empty() {
            out.push_str(&format.decimal_separator);
            if format.zero_digit != "0" {
                digits = remap_digits(&digits, &format.zero_digit);
            }
            out.push_str(&digits);
        }
    }

    if percent {
        out.push_str(&format.percent);
    } else if per_mille {
        out.push_str(&format.per_mille);
    }
    Ok(out)
}

fn remap_digits(digits: &str, zero_digit: &str) -> String {
    let Some(zero) = zero_digit.chars().next() else {
        return digits.to_string();
    };
    let base = zero as u32;
    digits
        .chars()
        .map(|ch| {
            if ch.is_ascii_digit() {
                char::from_u32(base + (ch as u32 - '0' as u32)).unwrap_or(ch)
            } else {
                ch
            }
        })
        .collect()
}

fn format_number(eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let value = args[0].to_number();
    let picture = args[1].to_string_value();
    let format_name = args
        .get(2)
        .map(|name| name.to_string_value())
        .unwrap_or_default();
    let format = eval
        .active_prolog()
        .decimal_formats
        .get(&format_name)
        .cloned()
        .unwrap_or_default();
    if !format_name.is_empty()
        && !eval
            .active_prolog()
            .decimal_formats
            .contains_key(&format_name)
    {
        return Err(Error::with_message(
            ErrorCode::FORG0001,
            format!("unknown decimal format '{format_name}'"),
        ));
    }
    Ok(XPathVal::String(apply_number_picture(
        value, &picture, &format,
    )?))
}

// ----- format-integer --------------------------------------------------

fn to_roman(mut value: u64, lowercase: bool) -> String {
    const NUMERALS: &[(u64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(weight, numeral) in NUMERALS {
        while value >= weight {
            out.push_str(numeral);
            value -= weight;
        }
    }
    if lowercase {
        out.to_lowercase()
    } else {
        out
    }
}

fn to_alphabetic(mut value: u64, lowercase: bool) -> String {
    let mut out = String::new();
    while value > 0 {
        let digit = ((value - 1) % 26) as u8;
        let base = if lowercase { b'a' } else { b'A' };
        out.insert(0, (base + digit) as char);
        value = (value - 1) / 26;
    }
    out
}

fn format_integer(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::String(String::new()));
    }
    let value = args[0].to_number();
    if value.fract() != 0.0 || value.is_nan() {
        return Err(Error::with_message(
            ErrorCode::FORG0006,
            "format-integer requires an integer value",
        ));
    }
    let picture = args[1].to_string_value();
    let negative = value < 0.0;
    let magnitude = value.abs() as u64;

    let formatted = match picture.as_str() {
        "a" => to_alphabetic(magnitude, true),
        "A" => to_alphabetic(magnitude, false),
        "i" => to_roman(magnitude, true),
        "I" => to_roman(magnitude, false),
        _ => {
            // digit pictures: `1`, `01`, `001`, optionally grouped
            let width = picture.chars().filter(|ch| ch.is_ascii_digit()).count();
            format!("{magnitude:0width$}")
        }
    };
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&formatted);
    Ok(XPathVal::String(out))
}

// ----- format-date / format-time / format-dateTime ---------------------

struct DateTimeParts {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    NAMES[((month.max(1) - 1) % 12) as usize]
}

// picture variables: [Y…] year, [M…] month, [D…] day, [H…] hour,
// [m…] minute, [s…] second, [MNn] month name; `[[`/`]]` escape
fn apply_date_picture(parts: &DateTimeParts, picture: &str) -> Result<String> {
    let mut out = String::new();
    let mut chars = picture.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '[' {
            if chars.peek() == Some(&'[') {
                chars.next();
                out.push('[');
                continue;
            }
            let mut variable = String::new();
            for inner in chars.by_ref() {
                if inner == ']' {
                    break;
                }
                variable.push(inner);
            }
            let component = variable.chars().next().unwrap_or(' ');
            let zero_padded = variable.contains("01") || variable.contains("00");
            let value = match component {
                'Y' => parts.year as i64,
                'M' => {
                    if variable.starts_with("MN") {
                        let name = month_name(parts.month);
                        let upper = name.to_uppercase();
                        out.push_str(if variable.starts_with("MNn") {
                            name
                        } else {
                            &upper
                        });
                        continue;
                    }
                    parts.month as i64
                }
                'D' => parts.day as i64,
                'H' => parts.hour as i64,
                'm' => parts.minute as i64,
                's' => parts.second as i64,
                other => {
                    return Err(Error::with_message(
                        ErrorCode::FORG0006,
                        format!("unsupported picture component '[{other}…]'"),
                    ))
                }
            };
            if zero_padded {
                out.push_str(&format!("{value:02}"));
            } else {
                out.push_str(&format!("{value}"));
            }
        } else if ch == ']' {
            if chars.peek() == Some(&']') {
                chars.next();
            }
            out.push(']');
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

fn format_date(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let date = parse_date(text.trim()).ok_or_else(|| {
        Error::with_message(ErrorCode::FODT0001, format!("invalid xs:date '{text}'"))
    })?;
    let parts = DateTimeParts {
        year: date.year(),
        month: date.month(),
        day: date.day(),
        hour: 0,
        minute: 0,
        second: 0,
    };
    Ok(XPathVal::String(apply_date_picture(
        &parts,
        &args[1].to_string_value(),
    )?))
}

fn format_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let time = parse_time(text.trim()).ok_or_else(|| {
        Error::with_message(ErrorCode::FODT0001, format!("invalid xs:time '{text}'"))
    })?;
    let parts = DateTimeParts {
        year: 0,
        month: 1,
        day: 1,
        hour: time.hour(),
        minute: time.minute(),
        second: time.second(),
    };
    Ok(XPathVal::String(apply_date_picture(
        &parts,
        &args[1].to_string_value(),
    )?))
}

fn format_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let value = parse_date_time(text.trim()).ok_or_else(|| {
        Error::with_message(ErrorCode::FODT0001, format!("invalid xs:dateTime '{text}'"))
    })?;
    let parts = DateTimeParts {
        year: value.year(),
        month: value.month(),
        day: value.day(),
        hour: value.hour(),
        minute: value.minute(),
        second: value.second(),
    };
    Ok(XPathVal::String(apply_date_picture(
        &parts,
        &args[1].to_string_value(),
    )?))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("format-number", 2, 3, format_number),
        BuiltinFunction::new("format-integer", 2, 3, format_integer),
        BuiltinFunction::new("format-date", 2, 5, format_date),
        BuiltinFunction::new("format-time", 2, 5, format_time),
        BuiltinFunction::new("format-dateTime", 2, 5, format_date_time),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_picture_basics() {
        let format = DecimalFormat::default();
        assert_eq!(
            apply_number_picture(1234.5, "#,##0.00", &format).unwrap(),
            "1,234.50"
        );
        assert_eq!(apply_number_picture(0.5, "0.0", &format).unwrap(), "0.5");
        assert_eq!(
            apply_number_picture(-42.0, "0", &format).unwrap(),
            "-42"
        );
        assert_eq!(
            apply_number_picture(f64::NAN, "0", &format).unwrap(),
            "NaN"
        );
    }

    #[test]
    fn roman_and_alphabetic() {
        assert_eq!(to_roman(1984, false), "MCMLXXXIV");
        assert_eq!(to_roman(4, true), "iv");
        assert_eq!(to_alphabetic(1, true), "a");
        assert_eq!(to_alphabetic(27, true), "aa");
        assert_eq!(to_alphabetic(26, false), "Z");
    }

    #[test]
    fn date_picture() {
        let parts = DateTimeParts {
            year: 2026,
            month: 8,
            day: 1,
            hour: 9,
            minute: 5,
            second: 7,
        };
        assert_eq!(
            apply_date_picture(&parts, "[Y0001]-[M01]-[D01]").unwrap(),
            "2026-08-01"
        );
        assert_eq!(
            apply_date_picture(&parts, "[D] [MNn] [Y]").unwrap(),
            "1 August 2026"
        );
        assert_eq!(
            apply_date_picture(&parts, "[H01]:[m01]:[s01]").unwrap(),
            "09:05:07"
        );
    }
}
