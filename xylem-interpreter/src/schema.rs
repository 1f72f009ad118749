//! The built-in atomic type catalogue used by `cast`, `castable`,
//! `instance of`, `treat as` and typeswitch matching.
//!
//! Values in this engine are untyped at runtime (string / double /
//! boolean), so type membership for the lexical types (dates, durations,
//! binaries, QNames) is judged by lexical validity of the string form.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, ErrorCode, Result};
use crate::value::{format_double, parse_double, XPathVal};

/// Built-in schema types addressable from queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Xs {
    AnyAtomicType,
    UntypedAtomic,
    Numeric,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    Id,
    Idref,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    NonNegativeInteger,
    PositiveInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
    DateTime,
    Date,
    Time,
    GYearMonth,
    GYear,
    GMonthDay,
    GMonth,
    GDay,
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
}

impl Xs {
    /// Looks a type up by its lexical QName (`xs:` prefixed or bare).
    pub fn by_name(name: &str) -> Option<Xs> {
        let local = name.strip_prefix("xs:").unwrap_or(name);
        let local = local
            .strip_prefix("Q{http://www.w3.org/2001/XMLSchema}")
            .unwrap_or(local);
        use Xs::*;
        Some(match local {
            "anyAtomicType" => AnyAtomicType,
            "untypedAtomic" => UntypedAtomic,
            "numeric" => Numeric,
            "string" => String,
            "normalizedString" => NormalizedString,
            "token" => Token,
            "language" => Language,
            "Name" => Name,
            "NCName" => NCName,
            "ID" => Id,
            "IDREF" => Idref,
            "boolean" => Boolean,
            "decimal" => Decimal,
            "integer" => Integer,
            "nonPositiveInteger" => NonPositiveInteger,
            "negativeInteger" => NegativeInteger,
            "nonNegativeInteger" => NonNegativeInteger,
            "positiveInteger" => PositiveInteger,
            "long" => Long,
            "int" => Int,
            "short" => Short,
            "byte" => Byte,
            "unsignedLong" => UnsignedLong,
            "unsignedInt" => UnsignedInt,
            "unsignedShort" => UnsignedShort,
            "unsignedByte" => UnsignedByte,
            "float" => Float,
            "double" => Double,
            "duration" => Duration,
            "yearMonthDuration" => YearMonthDuration,
            "dayTimeDuration" => DayTimeDuration,
            "dateTime" => DateTime,
            "date" => Date,
            "time" => Time,
            "gYearMonth" => GYearMonth,
            "gYear" => GYear,
            "gMonthDay" => GMonthDay,
            "gMonth" => GMonth,
            "gDay" => GDay,
            "hexBinary" => HexBinary,
            "base64Binary" => Base64Binary,
            "anyURI" => AnyUri,
            "QName" => QName,
            _ => return None,
        })
    }

    /// Immediate base type in the derivation hierarchy.
    pub fn parent(&self) -> Option<Xs> {
        use Xs::*;
        Some(match self {
            AnyAtomicType => return None,
            UntypedAtomic | Numeric | String | Boolean | Decimal | Float | Double | Duration
            | DateTime | Date | Time | GYearMonth | GYear | GMonthDay | GMonth | GDay
            | HexBinary | Base64Binary | AnyUri | QName => AnyAtomicType,
            NormalizedString => String,
            Token => NormalizedString,
            Language => Token,
            Name => Token,
            NCName => Name,
            Id | Idref => NCName,
            Integer => Decimal,
            NonPositiveInteger => Integer,
            NegativeInteger => NonPositiveInteger,
            Long => Integer,
            Int => Long,
            Short => Int,
            Byte => Short,
            NonNegativeInteger => Integer,
            UnsignedLong => NonNegativeInteger,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
            PositiveInteger => NonNegativeInteger,
            YearMonthDuration | DayTimeDuration => Duration,
        })
    }

    pub fn derives_from(&self, other: Xs) -> bool {
        if other == Xs::Numeric {
            return self.is_numeric();
        }
        let mut current = Some(*self);
        while let Some(xs) = current {
            if xs == other {
                return true;
            }
            current = xs.parent();
        }
        false
    }

    pub fn is_numeric(&self) -> bool {
        self.derives_from(Xs::Decimal)
            || matches!(self, Xs::Float | Xs::Double | Xs::Numeric)
    }

    fn is_integer_type(&self) -> bool {
        self.derives_from(Xs::Integer)
    }

    fn is_string_type(&self) -> bool {
        self.derives_from(Xs::String)
    }

    /// Whether a runtime value belongs to this type. Strings carry no
    /// type annotation, so the lexical types accept a string exactly when
    /// its lexical form is valid.
    pub fn matches_value(&self, value: &XPathVal) -> bool {
        match value {
            XPathVal::Number(number) => match self {
                Xs::AnyAtomicType | Xs::Numeric | Xs::Double | Xs::Float => true,
                Xs::Decimal => number.is_finite(),
                _ if self.is_integer_type() => {
                    number.is_finite()
                        && number.fract() == 0.0
                        && self.integer_in_range(*number)
                }
                _ => false,
            },
            XPathVal::Boolean(_) => matches!(self, Xs::AnyAtomicType | Xs::Boolean),
            XPathVal::String(text) => match self {
                Xs::AnyAtomicType | Xs::UntypedAtomic => true,
                _ if self.is_string_type() => self.validate_lexical(text),
                Xs::AnyUri => true,
                Xs::Boolean | Xs::Numeric | Xs::Double | Xs::Float | Xs::Decimal => false,
                _ if self.is_integer_type() => false,
                _ => self.validate_lexical(text),
            },
            XPathVal::NodeSet(set) if set.len() == 1 => {
                // atomised node value
                self.matches_value(&XPathVal::String(set.entries[0].string_value()))
            }
            _ => false,
        }
    }

    fn integer_in_range(&self, value: f64) -> bool {
        use Xs::*;
        match self {
            NonPositiveInteger => value <= 0.0,
            NegativeInteger => value < 0.0,
            NonNegativeInteger | UnsignedLong => value >= 0.0,
            PositiveInteger => value > 0.0,
            Long => (-9.223_372_036_854_776E18..=9.223_372_036_854_776E18).contains(&value),
            Int => (-2_147_483_648.0..=2_147_483_647.0).contains(&value),
            Short => (-32_768.0..=32_767.0).contains(&value),
            Byte => (-128.0..=127.0).contains(&value),
            UnsignedInt => (0.0..=4_294_967_295.0).contains(&value),
            UnsignedShort => (0.0..=65_535.0).contains(&value),
            UnsignedByte => (0.0..=255.0).contains(&value),
            _ => true,
        }
    }

    /// Lexical validity of `text` for this type.
    pub fn validate_lexical(&self, text: &str) -> bool {
        use Xs::*;
        let trimmed = text.trim();
        match self {
            AnyAtomicType | UntypedAtomic | String | AnyUri => true,
            NormalizedString => !text.contains(['\t', '\r', '\n']),
            Token => {
                !text.starts_with(' ')
                    && !text.ends_with(' ')
                    && !text.contains("  ")
                    && !text.contains(['\t', '\r', '\n'])
            }
            Language => {
                !trimmed.is_empty()
                    && trimmed
                        .split('-')
                        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()))
            }
            Name | NCName | Id | Idref => {
                is_ncname(trimmed) || (*self == Name && is_qname(trimmed))
            }
            Boolean => matches!(trimmed, "true" | "false" | "1" | "0"),
            Numeric | Double | Float => !parse_double(trimmed).is_nan() || trimmed == "NaN",
            Decimal => is_decimal(trimmed),
            _ if self.is_integer_type() => {
                is_integer(trimmed) && self.integer_in_range(parse_double(trimmed))
            }
            Duration => parse_duration(trimmed).is_some(),
            YearMonthDuration => {
                parse_duration(trimmed)
                    .map(|duration| duration.seconds == 0.0)
                    .unwrap_or(false)
                    && !trimmed.contains('T')
                    && !trimmed.contains('D')
            }
            DayTimeDuration => {
                parse_duration(trimmed).is_some()
                    && !trimmed.contains('Y')
                    && !has_month_component(trimmed)
            }
            DateTime => parse_date_time(trimmed).is_some(),
            Date => parse_date(trimmed).is_some(),
            Time => parse_time(trimmed).is_some(),
            GYearMonth => {
                let (body, _) = split_timezone(trimmed);
                NaiveDate::parse_from_str(&format!("{body}-01"), "%Y-%m-%d").is_ok()
            }
            GYear => {
                let (body, _) = split_timezone(trimmed);
                body.len() >= 4 && body.trim_start_matches('-').chars().all(|c| c.is_ascii_digit())
            }
            GMonthDay => {
                let (body, _) = split_timezone(trimmed);
                body.strip_prefix("--")
                    .map(|rest| NaiveDate::parse_from_str(&format!("2000-{rest}"), "%Y-%m-%d").is_ok())
                    .unwrap_or(false)
            }
            GMonth => {
                let (body, _) = split_timezone(trimmed);
                body.strip_prefix("--")
                    .and_then(|rest| rest.parse::<u32>().ok())
                    .map(|month| (1..=12).contains(&month))
                    .unwrap_or(false)
            }
            GDay => {
                let (body, _) = split_timezone(trimmed);
                body.strip_prefix("---")
                    .and_then(|rest| rest.parse::<u32>().ok())
                    .map(|day| (1..=31).contains(&day))
                    .unwrap_or(false)
            }
            HexBinary => {
                trimmed.len() % 2 == 0 && trimmed.chars().all(|c| c.is_ascii_hexdigit())
            }
            Base64Binary => trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | ' ')),
            QName => is_qname(trimmed),
            _ => unreachable!("covered by the is_integer_type() guard above"),
        }
    }

    /// Casts a runtime value to this type, producing the engine
    /// representation (number, boolean or canonical string).
    pub fn cast(&self, value: &XPathVal) -> Result<XPathVal> {
        use Xs::*;
        let atomized = match value {
            XPathVal::NodeSet(set) if set.len() == 1 => {
                XPathVal::String(set.entries[0].string_value())
            }
            XPathVal::Sequence(items) if items.len() == 1 => items[0].clone(),
            other => other.clone(),
        };
        if matches!(
            atomized,
            XPathVal::Empty | XPathVal::Sequence(_) | XPathVal::NodeSet(_)
        ) {
            return Err(Error::with_message(
                ErrorCode::XPTY0004,
                "cast requires a single atomic value",
            ));
        }

        match self {
            AnyAtomicType | UntypedAtomic => Ok(atomized),
            String | NormalizedString | Token | Language | Name | NCName | Id | Idref
            | AnyUri => {
                let text = atomized.to_string_value();
                if !self.validate_lexical(&text) {
                    return Err(cast_error(self, &text));
                }
                Ok(XPathVal::String(text))
            }
            Boolean => match &atomized {
                XPathVal::Boolean(flag) => Ok(XPathVal::Boolean(*flag)),
                XPathVal::Number(number) => {
                    if number.is_nan() {
                        Err(cast_error(self, "NaN"))
                    } else {
                        Ok(XPathVal::Boolean(*number != 0.0))
                    }
                }
                XPathVal::String(text) => match text.trim() {
                    "true" | "1" => Ok(XPathVal::Boolean(true)),
                    "false" | "0" => Ok(XPathVal::Boolean(false)),
                    other => Err(cast_error(self, other)),
                },
                _ => Err(cast_error(self, "")),
            },
            Numeric | Double | Float => {
                let number = atomized.to_number();
                if number.is_nan() && !is_nan_literal(&atomized) {
                    return Err(cast_error(self, &atomized.to_string_value()));
                }
                Ok(XPathVal::Number(number))
            }
            Decimal => {
                let number = atomized.to_number();
                if !number.is_finite() {
                    return Err(cast_error(self, &atomized.to_string_value()));
                }
                Ok(XPathVal::Number(number))
            }
            _ if self.is_integer_type() => {
                let number = match &atomized {
                    XPathVal::Number(number) => *number,
                    XPathVal::Boolean(flag) => {
                        if *flag {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    XPathVal::String(text) => {
                        let trimmed = text.trim();
                        if !is_decimal(trimmed) && !is_integer(trimmed) {
                            return Err(cast_error(self, trimmed));
                        }
                        parse_double(trimmed)
                    }
                    _ => return Err(cast_error(self, "")),
                };
                if !number.is_finite() {
                    return Err(cast_error(self, &format_double(number)));
                }
                let truncated = number.trunc();
                if !self.integer_in_range(truncated) {
                    return Err(cast_error(self, &format_double(number)));
                }
                Ok(XPathVal::Number(truncated))
            }
            // lexical types canonicalise through their string form
            _ => {
                let text = atomized.to_string_value();
                let trimmed = text.trim();
                if !self.validate_lexical(trimmed) {
                    return Err(cast_error(self, trimmed));
                }
                Ok(XPathVal::String(trimmed.to_string()))
            }
        }
    }
}

fn cast_error(target: &Xs, value: &str) -> Error {
    Error::with_message(
        ErrorCode::FORG0001,
        format!("cannot cast '{value}' to {target:?}"),
    )
}

fn is_nan_literal(value: &XPathVal) -> bool {
    match value {
        XPathVal::Number(number) => number.is_nan(),
        XPathVal::String(text) => text.trim() == "NaN",
        _ => false,
    }
}

pub fn is_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub fn is_qname(text: &str) -> bool {
    match text.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(text),
    }
}

fn is_integer(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    !body.is_empty() && body.chars().all(|c| c.is_ascii_digit())
}

fn is_decimal(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    if body.is_empty() {
        return false;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    for ch in body.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

// ----- date/time/duration lexical support ------------------------------

pub fn split_timezone(text: &str) -> (&str, Option<&str>) {
    if let Some(body) = text.strip_suffix('Z') {
        return (body, Some("Z"));
    }
    // a timezone suffix is +hh:mm / -hh:mm after the time part
    if text.len() > 6 {
        let (body, suffix) = text.split_at(text.len() - 6);
        let bytes = suffix.as_bytes();
        if (bytes[0] == b'+' || bytes[0] == b'-') && bytes[3] == b':' {
            // dates such as 2020-01-01 also end with a digit pattern that
            // looks like a timezone; require a sign character
            if suffix[1..3].chars().all(|c| c.is_ascii_digit())
                && suffix[4..6].chars().all(|c| c.is_ascii_digit())
            {
                return (body, Some(suffix));
            }
        }
    }
    (text, None)
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let (body, _) = split_timezone(text);
    NaiveDate::parse_from_str(body, "%Y-%m-%d").ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let (body, _) = split_timezone(text);
    NaiveTime::parse_from_str(body, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(body, "%H:%M:%S"))
        .ok()
}

pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let (body, _) = split_timezone(text);
    NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedDuration {
    pub negative: bool,
    pub months: i64,
    pub seconds: f64,
}

fn has_month_component(text: &str) -> bool {
    // an `M` before the `T` separator is a month, after it a minute
    match text.split_once('T') {
        Some((date_part, _)) => date_part.contains('M'),
        None => text.contains('M'),
    }
}

/// Parses `-PnYnMnDTnHnMnS` duration lexical forms.
pub fn parse_duration(text: &str) -> Option<ParsedDuration> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date_part, time_part)) => {
            if time_part.is_empty() {
                return None;
            }
            (date_part, Some(time_part))
        }
        None => (rest, None),
    };

    let mut months = 0i64;
    let mut seconds = 0f64;
    let mut saw_component = false;

    let mut number = String::new();
    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
            continue;
        }
        let value: i64 = number.parse().ok()?;
        number.clear();
        saw_component = true;
        match ch {
            'Y' => months += value * 12,
            'M' => months += value,
            'D' => seconds += value as f64 * 86_400.0,
            _ => return None,
        }
    }
    if !number.is_empty() {
        return None;
    }

    if let Some(time_part) = time_part {
        let mut fraction = false;
        for ch in time_part.chars() {
            if ch.is_ascii_digit() || (ch == '.' && !fraction) {
                if ch == '.' {
                    fraction = true;
                }
                number.push(ch);
                continue;
            }
            let value: f64 = number.parse().ok()?;
            number.clear();
            fraction = false;
            saw_component = true;
            match ch {
                'H' => seconds += value * 3_600.0,
                'M' => seconds += value * 60.0,
                'S' => seconds += value,
                _ => return None,
            }
        }
        if !number.is_empty() {
            return None;
        }
    }

    if !saw_component {
        return None;
    }
    Some(ParsedDuration {
        negative,
        months,
        seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_walks_to_any_atomic() {
        assert!(Xs::Integer.derives_from(Xs::Decimal));
        assert!(Xs::Integer.derives_from(Xs::AnyAtomicType));
        assert!(Xs::NCName.derives_from(Xs::String));
        assert!(!Xs::Integer.derives_from(Xs::String));
        assert!(Xs::Short.derives_from(Xs::Numeric));
    }

    #[test]
    fn integer_matching_requires_integral_value() {
        assert!(Xs::Integer.matches_value(&XPathVal::Number(42.0)));
        assert!(!Xs::Integer.matches_value(&XPathVal::Number(42.5)));
        assert!(!Xs::Integer.matches_value(&XPathVal::String("42".into())));
        assert!(Xs::Double.matches_value(&XPathVal::Number(42.5)));
    }

    #[test]
    fn string_does_not_match_numeric_types() {
        assert!(Xs::String.matches_value(&XPathVal::String("x".into())));
        assert!(!Xs::Double.matches_value(&XPathVal::String("1.5".into())));
        assert!(!Xs::String.matches_value(&XPathVal::Number(1.0)));
    }

    #[test]
    fn cast_string_to_integer() {
        let result = Xs::Integer.cast(&XPathVal::String("5".into())).unwrap();
        assert_eq!(result.to_number(), 5.0);
        assert!(Xs::Integer.cast(&XPathVal::String("5.5x".into())).is_err());
    }

    #[test]
    fn cast_double_to_integer_truncates() {
        let result = Xs::Integer.cast(&XPathVal::Number(3.9)).unwrap();
        assert_eq!(result.to_number(), 3.0);
        let result = Xs::Integer.cast(&XPathVal::Number(-3.9)).unwrap();
        assert_eq!(result.to_number(), -3.0);
    }

    #[test]
    fn cast_to_boolean() {
        assert_eq!(
            Xs::Boolean
                .cast(&XPathVal::String("true".into()))
                .unwrap()
                .to_boolean(),
            true
        );
        assert!(Xs::Boolean.cast(&XPathVal::String("yes".into())).is_err());
    }

    #[test]
    fn date_lexical_forms() {
        assert!(Xs::Date.validate_lexical("2020-02-29"));
        assert!(!Xs::Date.validate_lexical("2020-02-30"));
        assert!(Xs::Date.validate_lexical("2020-01-01Z"));
        assert!(Xs::Date.validate_lexical("2020-01-01+05:00"));
        assert!(Xs::DateTime.validate_lexical("2020-01-01T10:30:00"));
        assert!(Xs::Time.validate_lexical("10:30:00.5"));
    }

    #[test]
    fn duration_lexical_forms() {
        assert_eq!(
            parse_duration("P1Y2M"),
            Some(ParsedDuration {
                negative: false,
                months: 14,
                seconds: 0.0
            })
        );
        let day_time = parse_duration("PT1H30M").unwrap();
        assert_eq!(day_time.seconds, 5_400.0);
        assert!(parse_duration("P").is_none());
        assert!(parse_duration("P1H").is_none());
        assert!(Xs::DayTimeDuration.validate_lexical("P2DT12H"));
        assert!(!Xs::DayTimeDuration.validate_lexical("P1Y"));
    }

    #[test]
    fn qname_lexical_forms() {
        assert!(Xs::QName.validate_lexical("a:b"));
        assert!(Xs::QName.validate_lexical("name"));
        assert!(!Xs::QName.validate_lexical("1bad"));
        assert!(!Xs::QName.validate_lexical("a:b:c"));
    }

    #[test]
    fn unsigned_byte_range() {
        assert!(Xs::UnsignedByte.matches_value(&XPathVal::Number(255.0)));
        assert!(!Xs::UnsignedByte.matches_value(&XPathVal::Number(256.0)));
        assert!(!Xs::UnsignedByte.matches_value(&XPathVal::Number(-1.0)));
    }
}
