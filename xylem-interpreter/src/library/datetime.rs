// https://www.w3.org/TR/xpath-functions/#dates-times
//
// Date/time values travel as canonical lexical strings; the component
// extractors parse them on demand.

use chrono::{Datelike, Timelike};

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::schema::{parse_date, parse_date_time, parse_duration, parse_time, split_timezone};
use crate::value::XPathVal;

use super::BuiltinFunction;

fn offset_lexical(seconds: i32) -> String {
    if seconds == 0 {
        return "Z".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    format!("{sign}{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

fn current_date(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    let offset = offset_lexical(eval.now.offset().local_minus_utc());
    Ok(XPathVal::String(format!(
        "{}{offset}",
        eval.now.format("%Y-%m-%d")
    )))
}

fn current_time(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    let offset = offset_lexical(eval.now.offset().local_minus_utc());
    Ok(XPathVal::String(format!(
        "{}{offset}",
        eval.now.format("%H:%M:%S%.3f")
    )))
}

fn current_date_time(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    let offset = offset_lexical(eval.now.offset().local_minus_utc());
    Ok(XPathVal::String(format!(
        "{}{offset}",
        eval.now.format("%Y-%m-%dT%H:%M:%S%.3f")
    )))
}

// the implicit timezone as an xs:dayTimeDuration
fn implicit_timezone(eval: &mut Evaluator, _args: Vec<XPathVal>) -> Result<XPathVal> {
    let seconds = eval.now.offset().local_minus_utc();
    let sign = if seconds < 0 { "-" } else { "" };
    let total = seconds.abs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let value = if minutes == 0 {
        format!("{sign}PT{hours}H")
    } else {
        format!("{sign}PT{hours}H{minutes}M")
    };
    Ok(XPathVal::String(value))
}

fn bad_lexical(kind: &str, value: &str) -> Error {
    Error::with_message(
        ErrorCode::FODT0001,
        format!("'{value}' is not a valid {kind} value"),
    )
}

fn date_component(args: &[XPathVal], pick: impl Fn(chrono::NaiveDate) -> f64) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let date = parse_date(text.trim()).ok_or_else(|| bad_lexical("xs:date", &text))?;
    Ok(XPathVal::Number(pick(date)))
}

fn date_time_component(
    args: &[XPathVal],
    pick: impl Fn(chrono::NaiveDateTime) -> f64,
) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let value =
        parse_date_time(text.trim()).ok_or_else(|| bad_lexical("xs:dateTime", &text))?;
    Ok(XPathVal::Number(pick(value)))
}

fn time_component(args: &[XPathVal], pick: impl Fn(chrono::NaiveTime) -> f64) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let time = parse_time(text.trim()).ok_or_else(|| bad_lexical("xs:time", &text))?;
    Ok(XPathVal::Number(pick(time)))
}

fn year_from_date(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_component(&args, |date| date.year() as f64)
}

fn month_from_date(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_component(&args, |date| date.month() as f64)
}

fn day_from_date(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_component(&args, |date| date.day() as f64)
}

fn year_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_time_component(&args, |value| value.year() as f64)
}

fn month_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_time_component(&args, |value| value.month() as f64)
}

fn day_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_time_component(&args, |value| value.day() as f64)
}

fn hours_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_time_component(&args, |value| value.hour() as f64)
}

fn minutes_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_time_component(&args, |value| value.minute() as f64)
}

fn seconds_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    date_time_component(&args, |value| {
        value.second() as f64 + value.nanosecond() as f64 / 1e9
    })
}

fn hours_from_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    time_component(&args, |time| time.hour() as f64)
}

fn minutes_from_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    time_component(&args, |time| time.minute() as f64)
}

fn seconds_from_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    time_component(&args, |time| {
        time.second() as f64 + time.nanosecond() as f64 / 1e9
    })
}

fn timezone_from(text: &str) -> XPathVal {
    match split_timezone(text.trim()).1 {
        Some("Z") => XPathVal::String("PT0S".to_string()),
        Some(offset) => {
            let sign = if offset.starts_with('-') { "-" } else { "" };
            let hours: i32 = offset[1..3].parse().unwrap_or(0);
            let minutes: i32 = offset[4..6].parse().unwrap_or(0);
            let value = if minutes == 0 {
                format!("{sign}PT{hours}H")
            } else {
                format!("{sign}PT{hours}H{minutes}M")
            };
            XPathVal::String(value)
        }
        None => XPathVal::Empty,
    }
}

fn timezone_from_date_time(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    Ok(timezone_from(&args[0].to_string_value()))
}

fn duration_component(args: &[XPathVal], pick: impl Fn(i64, f64) -> f64) -> Result<XPathVal> {
    if args[0].is_empty() {
        return Ok(XPathVal::Empty);
    }
    let text = args[0].to_string_value();
    let duration =
        parse_duration(text.trim()).ok_or_else(|| bad_lexical("xs:duration", &text))?;
    let sign = if duration.negative { -1.0 } else { 1.0 };
    Ok(XPathVal::Number(
        sign * pick(duration.months, duration.seconds),
    ))
}

fn years_from_duration(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    duration_component(&args, |months, _| (months / 12) as f64)
}

fn months_from_duration(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    duration_component(&args, |months, _| (months % 12) as f64)
}

fn days_from_duration(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    duration_component(&args, |_, seconds| (seconds / 86_400.0).trunc())
}

fn hours_from_duration(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    duration_component(&args, |_, seconds| ((seconds % 86_400.0) / 3_600.0).trunc())
}

fn minutes_from_duration(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    duration_component(&args, |_, seconds| ((seconds % 3_600.0) / 60.0).trunc())
}

fn seconds_from_duration(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    duration_component(&args, |_, seconds| seconds % 60.0)
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("current-date", 0, 0, current_date),
        BuiltinFunction::new("current-time", 0, 0, current_time),
        BuiltinFunction::new("current-dateTime", 0, 0, current_date_time),
        BuiltinFunction::new("implicit-timezone", 0, 0, implicit_timezone),
        BuiltinFunction::new("year-from-date", 1, 1, year_from_date),
        BuiltinFunction::new("month-from-date", 1, 1, month_from_date),
        BuiltinFunction::new("day-from-date", 1, 1, day_from_date),
        BuiltinFunction::new("year-from-dateTime", 1, 1, year_from_date_time),
        BuiltinFunction::new("month-from-dateTime", 1, 1, month_from_date_time),
        BuiltinFunction::new("day-from-dateTime", 1, 1, day_from_date_time),
        BuiltinFunction::new("hours-from-dateTime", 1, 1, hours_from_date_time),
        BuiltinFunction::new("minutes-from-dateTime", 1, 1, minutes_from_date_time),
        BuiltinFunction::new("seconds-from-dateTime", 1, 1, seconds_from_date_time),
        BuiltinFunction::new("hours-from-time", 1, 1, hours_from_time),
        BuiltinFunction::new("minutes-from-time", 1, 1, minutes_from_time),
        BuiltinFunction::new("seconds-from-time", 1, 1, seconds_from_time),
        BuiltinFunction::new("timezone-from-dateTime", 1, 1, timezone_from_date_time),
        BuiltinFunction::new("years-from-duration", 1, 1, years_from_duration),
        BuiltinFunction::new("months-from-duration", 1, 1, months_from_duration),
        BuiltinFunction::new("days-from-duration", 1, 1, days_from_duration),
        BuiltinFunction::new("hours-from-duration", 1, 1, hours_from_duration),
        BuiltinFunction::new("minutes-from-duration", 1, 1, minutes_from_duration),
        BuiltinFunction::new("seconds-from-duration", 1, 1, seconds_from_duration),
    ]
}
