// Copyright 2025 Oxide Computer Company

//! Text-to-value conversion table
//!
//! This module maps each [`SemanticType`] to a parser that turns a path
//! capture (or other raw string) into a typed [`Value`], and to the
//! canonical wire rendering used by the response serializer.  The two
//! directions share one table so that every value the parser produces can
//! be rendered back into a form the parser accepts (round-trip
//! idempotence).
//!
//! The table is process-wide and read-only, with one deliberate exception:
//! the boolean truthy/falsy token sets, which are mutable configuration.
//! They are expected to be populated once during process startup, before
//! any request traffic begins; no promise is made about the visibility of
//! mutations made concurrently with in-flight requests.

use crate::value::Value;
use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::sync::PoisonError;
use std::sync::RwLock;
use uuid::Uuid;

/// The target value type of a conversion, independent of its wire
/// representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Boolean,
    Integer,
    Float,
    String,
    Uuid,
    Date,
    DateTime,
    Ipv4,
    Ipv6,
    /// The absent value.  Mostly useful as a member of a union type.
    Unit,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Boolean => "boolean",
            SemanticType::Integer => "integer",
            SemanticType::Float => "float",
            SemanticType::String => "string",
            SemanticType::Uuid => "uuid",
            SemanticType::Date => "date",
            SemanticType::DateTime => "date-time",
            SemanticType::Ipv4 => "ipv4",
            SemanticType::Ipv6 => "ipv6",
            SemanticType::Unit => "unit",
        };
        f.write_str(name)
    }
}

/// Failure to convert a raw string into a target type.
///
/// The argument resolver wraps this into
/// [`DispatchError::ValueParse`](crate::DispatchError::ValueParse), adding
/// the parameter name.
#[derive(Clone, Debug, thiserror::Error)]
#[error("unable to parse {raw:?} as {target}")]
pub struct ParseError {
    pub raw: String,
    pub target: String,
}

impl ParseError {
    fn new(raw: &str, target: SemanticType) -> ParseError {
        ParseError { raw: raw.to_string(), target: target.to_string() }
    }
}

impl SemanticType {
    /// Parse `raw` into a [`Value`] of this semantic type.
    pub fn parse(&self, raw: &str) -> Result<Value, ParseError> {
        match self {
            SemanticType::Boolean => convert_bool(raw).map(Value::Bool),
            SemanticType::Integer => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ParseError::new(raw, *self)),
            SemanticType::Float => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ParseError::new(raw, *self)),
            SemanticType::String => Ok(Value::String(raw.to_string())),
            SemanticType::Uuid => Uuid::parse_str(raw)
                .map(Value::Uuid)
                .map_err(|_| ParseError::new(raw, *self)),
            SemanticType::Date => parse_date(raw).map(Value::Date),
            SemanticType::DateTime => {
                parse_datetime(raw).map(Value::DateTime)
            }
            SemanticType::Ipv4 => raw
                .parse::<Ipv4Addr>()
                .map(|a| Value::Ip(IpAddr::V4(a)))
                .map_err(|_| ParseError::new(raw, *self)),
            SemanticType::Ipv6 => raw
                .parse::<Ipv6Addr>()
                .map(|a| Value::Ip(IpAddr::V6(a)))
                .map_err(|_| ParseError::new(raw, *self)),
            SemanticType::Unit => Ok(Value::Null),
        }
    }

    /// OpenAPI-style `(type, format)` pair for this semantic type, used by
    /// schema-document collaborators.
    pub fn schema(&self) -> (&'static str, Option<&'static str>) {
        match self {
            SemanticType::Boolean => ("boolean", None),
            SemanticType::Integer => ("integer", None),
            SemanticType::Float => ("number", None),
            SemanticType::String => ("string", None),
            SemanticType::Uuid => ("string", Some("uuid")),
            SemanticType::Date => ("string", Some("date")),
            SemanticType::DateTime => ("string", Some("date-time")),
            SemanticType::Ipv4 => ("string", Some("ipv4")),
            SemanticType::Ipv6 => ("string", Some("ipv6")),
            SemanticType::Unit => ("null", None),
        }
    }
}

/// String tokens recognized as truthy or falsy by boolean conversion.
///
/// Both sets start out empty, so by default only decimal integer strings
/// convert to booleans.  Token matching is exact (case-sensitive); callers
/// that want case-insensitive behavior should insert each casing they
/// accept.
#[derive(Debug)]
pub struct BooleanTokens {
    truthy: BTreeSet<String>,
    falsy: BTreeSet<String>,
}

impl BooleanTokens {
    pub fn insert_truthy<S: Into<String>>(&mut self, token: S) {
        self.truthy.insert(token.into());
    }

    pub fn insert_falsy<S: Into<String>>(&mut self, token: S) {
        self.falsy.insert(token.into());
    }

    /// Remove `token` from whichever set contains it.
    pub fn remove(&mut self, token: &str) {
        self.truthy.remove(token);
        self.falsy.remove(token);
    }

    pub fn clear(&mut self) {
        self.truthy.clear();
        self.falsy.clear();
    }

    pub fn is_truthy(&self, token: &str) -> bool {
        self.truthy.contains(token)
    }

    pub fn is_falsy(&self, token: &str) -> bool {
        self.falsy.contains(token)
    }
}

static BOOLEAN_TOKENS: RwLock<BooleanTokens> = RwLock::new(BooleanTokens {
    truthy: BTreeSet::new(),
    falsy: BTreeSet::new(),
});

/// Modify the process-wide boolean token sets.
///
/// This is startup configuration: call it before any request traffic
/// begins.  Mutations made while requests are in flight are applied, but
/// their visibility to concurrent conversions is unspecified.
pub fn configure_boolean_tokens<F>(f: F)
where
    F: FnOnce(&mut BooleanTokens),
{
    let mut tokens =
        BOOLEAN_TOKENS.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut tokens);
}

/// Convert `raw` into a boolean.
///
/// The string is first tested for decimal-integer parseability: zero maps
/// to false and any non-zero value maps to true, with no bound on the
/// number of digits.  Otherwise the configured truthy/falsy token sets are
/// consulted.  Membership in neither set is a parse error.
pub fn convert_bool(raw: &str) -> Result<bool, ParseError> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n != 0);
    }
    // A digit string too wide for i64 is still a decimal integer.  Zero
    // always fits, so an overflowing one is necessarily non-zero.
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(true);
    }
    let tokens =
        BOOLEAN_TOKENS.read().unwrap_or_else(PoisonError::into_inner);
    if tokens.is_truthy(raw) {
        return Ok(true);
    }
    if tokens.is_falsy(raw) {
        return Ok(false);
    }
    Err(ParseError::new(raw, SemanticType::Boolean))
}

// Fallback patterns tried after full ISO-8601 parsing, in priority order.
// These tolerate the common non-separator and reduced-precision variants.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Parse `raw` into a date-time according to ISO-8601.
///
/// Offset-bearing values are parsed with their offset preserved.  Values
/// without an offset are taken as UTC.  After the extended format, a small
/// fixed list of near-ISO-8601 patterns is tried in priority order; the
/// first pattern that matches wins, down to bare years.
pub fn parse_datetime(raw: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt.and_utc().fixed_offset());
        }
    }
    parse_partial_date(raw)
        .map(|d| {
            d.and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time")
                .and_utc()
                .fixed_offset()
        })
        .ok_or_else(|| ParseError::new(raw, SemanticType::DateTime))
}

/// Parse `raw` as a date-time and discard the time of day.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ParseError> {
    parse_datetime(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| ParseError::new(raw, SemanticType::Date))
}

// Date forms with missing components default those components to 1, the way
// strptime-style parsing does.
fn parse_partial_date(raw: &str) -> Option<NaiveDate> {
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d")
    {
        return Some(d);
    }
    if raw.len() == 6 && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(d) =
            NaiveDate::parse_from_str(&format!("{}01", raw), "%Y%m%d")
        {
            return Some(d);
        }
    }
    if let Ok(year) = raw.parse::<i32>() {
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    None
}

/// Canonical rendering of a date: ISO-8601 extended, `YYYY-MM-DD`.
pub(crate) fn render_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Canonical rendering of a date-time: RFC 3339 with the offset written as
/// `+HH:MM` and fractional seconds preserved.
pub(crate) fn render_datetime(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339()
}

/// Render a span of `seconds` as an ISO-8601 duration (e.g. `PT2H30M`).
/// Only the seconds place keeps sub-unit precision, rounded to
/// microseconds.
pub fn format_isoduration(seconds: f64) -> String {
    if seconds == 0.0 {
        return "PT0S".to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut rem = seconds;
    let mut prec = true;
    for (unit, reduction) in [("S", 60.0), ("M", 60.0), ("H", 24.0)] {
        let value = rem % reduction;
        rem = (rem - value) / reduction;
        if value != 0.0 {
            if prec {
                let rounded = (value * 1e6).round() / 1e6;
                if rounded.fract() == 0.0 {
                    parts.push(format!("{}{}", rounded as i64, unit));
                } else {
                    parts.push(format!("{}{}", rounded, unit));
                }
            } else {
                parts.push(format!("{}{}", value as i64, unit));
            }
        }
        prec = false;
    }

    parts.push("T".to_string());
    if rem != 0.0 {
        parts.push(format!("{}D", rem as i64));
    }
    parts.push("P".to_string());

    parts.iter().rev().flat_map(|s| s.chars()).collect()
}

#[cfg(test)]
mod test {
    use super::configure_boolean_tokens;
    use super::convert_bool;
    use super::format_isoduration;
    use super::parse_date;
    use super::parse_datetime;
    use super::SemanticType;
    use crate::value::Value;
    use chrono::NaiveDate;

    // The boolean token sets are process-wide, so everything that mutates
    // them lives in this one test.
    #[test]
    fn test_convert_bool() {
        assert!(!convert_bool("0").unwrap());
        assert!(convert_bool("7").unwrap());
        assert!(!convert_bool("-0").unwrap());
        assert!(convert_bool("-1").unwrap());

        // digit strings wider than i64 are still decimal integers
        assert!(convert_bool("99999999999999999999999999").unwrap());
        assert!(convert_bool("-99999999999999999999999999").unwrap());
        assert!(!convert_bool("0000000000000000000000000").unwrap());
        assert!(convert_bool("+").is_err());

        assert!(convert_bool("yes").is_err());
        configure_boolean_tokens(|t| {
            t.insert_truthy("yes");
            t.insert_falsy("no");
        });
        assert!(convert_bool("yes").unwrap());
        assert!(!convert_bool("no").unwrap());
        assert!(convert_bool("maybe").is_err());
        let error = convert_bool("maybe").unwrap_err();
        assert_eq!(error.raw, "maybe");
        assert_eq!(error.target, "boolean");

        configure_boolean_tokens(|t| t.clear());
        assert!(convert_bool("yes").is_err());
    }

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2024-03-03T20:25:50.286858+00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-03T20:25:50.286858+00:00");

        // offsets are preserved
        let dt = parse_datetime("2024-03-03T20:25:50-05:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-03T20:25:50-05:00");

        // naive values are taken as UTC
        let dt = parse_datetime("2024-03-03T20:25:50").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-03T20:25:50+00:00");

        // reduced-precision fallbacks, first match wins
        for (raw, expected) in [
            ("2024-03-03", "2024-03-03T00:00:00+00:00"),
            ("20240303", "2024-03-03T00:00:00+00:00"),
            ("2024-03", "2024-03-01T00:00:00+00:00"),
            ("202403", "2024-03-01T00:00:00+00:00"),
            ("2024", "2024-01-01T00:00:00+00:00"),
        ] {
            let dt = parse_datetime(raw).unwrap();
            assert_eq!(dt.to_rfc3339(), expected, "input {:?}", raw);
        }

        assert!(parse_datetime("not-a-date").is_err());
        assert!(parse_datetime("2024-13-40").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-03").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()
        );
        // the time of day is discarded
        assert_eq!(
            parse_date("2024-03-03T20:25:50+00:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()
        );
        let error = parse_date("03/03/2024").unwrap_err();
        assert_eq!(error.target, "date");
    }

    #[test]
    fn test_scalar_parsing() {
        assert_eq!(
            SemanticType::Integer.parse("-42").unwrap(),
            Value::Int(-42)
        );
        assert!(SemanticType::Integer.parse("0x10").is_err());
        assert_eq!(
            SemanticType::Float.parse("2.5").unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            SemanticType::String.parse("plain").unwrap(),
            Value::String("plain".to_string())
        );
        assert_eq!(SemanticType::Unit.parse("anything").unwrap(), Value::Null);

        let nil = SemanticType::Uuid
            .parse("00000000-0000-0000-0000-000000000000")
            .unwrap();
        assert_eq!(nil, Value::Uuid(uuid::Uuid::nil()));
        assert!(SemanticType::Uuid.parse("not-a-uuid").is_err());

        assert!(SemanticType::Ipv4.parse("192.168.0.1").is_ok());
        assert!(SemanticType::Ipv4.parse("192.168.0.256").is_err());
        assert!(SemanticType::Ipv6.parse("::1").is_ok());
        assert!(SemanticType::Ipv6.parse("192.168.0.1").is_err());
    }

    // Round-trip idempotence: for every value the parser produces,
    // rendering it and parsing the rendering yields the same value.
    #[test]
    fn test_round_trips() {
        let cases = [
            (SemanticType::Boolean, "7"),
            (SemanticType::Integer, "1000"),
            (SemanticType::Float, "-2.25"),
            (SemanticType::String, "hello"),
            (SemanticType::Uuid, "8c2cf754-3176-4a63-9f91-23ce1e38a0b9"),
            (SemanticType::Date, "2024-03-03"),
            (SemanticType::DateTime, "2024-03-03T20:25:50.286858+00:00"),
            (SemanticType::Ipv4, "10.1.2.3"),
            (SemanticType::Ipv6, "fd00::1"),
        ];
        for (ty, raw) in cases {
            let parsed = ty.parse(raw).unwrap();
            let rendered = match &parsed {
                Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
                Value::Int(n) => n.to_string(),
                Value::Float(f) => f.to_string(),
                Value::String(s) => s.clone(),
                Value::Uuid(u) => u.to_string(),
                Value::Date(d) => super::render_date(d),
                Value::DateTime(dt) => super::render_datetime(dt),
                Value::Ip(ip) => ip.to_string(),
                other => panic!("unexpected value {:?}", other),
            };
            let reparsed = ty.parse(&rendered).unwrap();
            assert_eq!(parsed, reparsed, "round trip for {:?}", raw);
        }
    }

    #[test]
    fn test_format_isoduration() {
        assert_eq!(format_isoduration(0.0), "PT0S");
        assert_eq!(format_isoduration(1.5), "PT1.5S");
        assert_eq!(format_isoduration(90.0), "PT1M30S");
        assert_eq!(format_isoduration(3600.0), "PT1H");
        assert_eq!(format_isoduration(90061.0), "P1DT1H1M1S");
    }
}
