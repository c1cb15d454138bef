//! Cell-level normalization: raw CSV strings into typed values.
//!
//! Every parser here is total. Bad input produces `None` (or `false` for booleans),
//! never an error, so a single malformed cell can only ever null out its own field.
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

/// Target type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    /// Date portion of a `date time` cell such as `9/24/2025 16:04`.
    DatePrefix,
}

/// A normalized cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(BigDecimal),
    Boolean(bool),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Whether this value may be stored in a column of `ty`. Null fits every type.
    pub fn fits(&self, ty: FieldType) -> bool {
        match (self, ty) {
            (FieldValue::Null, _) => true,
            (FieldValue::Text(_), FieldType::Text) => true,
            (FieldValue::Integer(_), FieldType::Integer) => true,
            (FieldValue::Decimal(_), FieldType::Decimal) => true,
            (FieldValue::Boolean(_), FieldType::Boolean) => true,
            (FieldValue::Date(_), FieldType::Date | FieldType::DatePrefix) => true,
            _ => false,
        }
    }

    /// Text used when this value participates in a business key.
    pub fn key_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Decimal(d) => Some(d.normalized().to_string()),
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_text() {
            Some(s) => f.write_str(&s),
            None => f.write_str("null"),
        }
    }
}

const NULL_LITERAL: &str = "None";
const TRUTHY: [&str; 4] = ["true", "1", "yes", "t"];

/// Patterns tried in order; the first that parses wins.
pub const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Trimmed text, or `None` for absent, empty and the literal `None`.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || value == NULL_LITERAL {
        return None;
    }
    Some(value.to_string())
}

/// Integer via a float parse then truncation, so `"12.0"` and `"12.9"` both give 12.
pub fn parse_integer(raw: Option<&str>) -> Option<i64> {
    let value = clean_text(raw)?;
    let parsed = value.parse::<f64>().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    let truncated = parsed.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

/// Decimal with a leading currency symbol and grouping commas removed: `"$1,234.50"`.
pub fn parse_decimal(raw: Option<&str>) -> Option<BigDecimal> {
    let value = clean_text(raw)?;
    // sign may sit on either side of the symbol: "-$500" and "$-500"
    let (sign, rest) = match value.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", value.as_str()),
    };
    let rest = rest.strip_prefix('$').unwrap_or(rest);
    let stripped: String = sign
        .chars()
        .chain(rest.chars().filter(|c| *c != ','))
        .collect();
    let stripped = stripped.trim();
    if stripped.is_empty() || stripped == NULL_LITERAL {
        return None;
    }
    // BigDecimal accepts exponent notation; reject anything that is not plain digits.
    if !stripped
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
    {
        return None;
    }
    BigDecimal::from_str(stripped).ok()
}

/// Case-insensitive match against `true`, `1`, `yes`, `t`. Anything else is false.
pub fn parse_boolean(raw: Option<&str>) -> bool {
    match clean_text(raw) {
        Some(v) => TRUTHY.contains(&v.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Outcome of the ordered date parse, keeping track of US/EU ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateParse {
    Invalid,
    Parsed(NaiveDate),
    /// Both `MM/DD/YYYY` and `DD/MM/YYYY` matched with different results.
    /// `chosen` is the earlier pattern's reading.
    Ambiguous {
        chosen: NaiveDate,
        alternative: NaiveDate,
    },
}

impl DateParse {
    pub fn chosen(self) -> Option<NaiveDate> {
        match self {
            DateParse::Invalid => None,
            DateParse::Parsed(d) => Some(d),
            DateParse::Ambiguous { chosen, .. } => Some(chosen),
        }
    }

    pub fn is_ambiguous(self) -> bool {
        matches!(self, DateParse::Ambiguous { .. })
    }
}

/// Parse a date cell, reporting whether the slash formats disagree.
pub fn parse_date_checked(raw: Option<&str>) -> DateParse {
    let Some(value) = clean_text(raw) else {
        return DateParse::Invalid;
    };
    let mut matches = DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(&value, fmt).ok());
    let Some(chosen) = matches.next() else {
        return DateParse::Invalid;
    };
    match matches.find(|d| *d != chosen) {
        Some(alternative) => DateParse::Ambiguous {
            chosen,
            alternative,
        },
        None => DateParse::Parsed(chosen),
    }
}

/// First matching pattern wins; `None` when nothing matches.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    parse_date_checked(raw).chosen()
}

/// Same as [`parse_date_checked`] on the text before the first whitespace.
pub fn parse_date_prefix_checked(raw: Option<&str>) -> DateParse {
    let head = raw.and_then(|s| s.split_whitespace().next());
    parse_date_checked(head)
}

/// Normalize one cell into `ty`. Dates that are ambiguous are resolved to the
/// first pattern's reading here; callers wanting to flag them use `parse_date_checked`.
pub fn normalize(raw: Option<&str>, ty: FieldType) -> FieldValue {
    match ty {
        FieldType::Text => clean_text(raw).map_or(FieldValue::Null, FieldValue::Text),
        FieldType::Integer => parse_integer(raw).map_or(FieldValue::Null, FieldValue::Integer),
        FieldType::Decimal => parse_decimal(raw).map_or(FieldValue::Null, FieldValue::Decimal),
        FieldType::Boolean => FieldValue::Boolean(parse_boolean(raw)),
        FieldType::Date => parse_date(raw).map_or(FieldValue::Null, FieldValue::Date),
        FieldType::DatePrefix => parse_date_prefix_checked(raw)
            .chosen()
            .map_or(FieldValue::Null, FieldValue::Date),
    }
}
