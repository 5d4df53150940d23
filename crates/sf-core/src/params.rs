//! # Validated Query Parameters
//!
//! Every value a user types into a modal ends up inside SQL text. These
//! newtypes are the only way to get such a value into a report builder,
//! and each one checks its input on construction.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("'{value}' is not a valid {what} (expected a positive integer)")]
    InvalidId { what: &'static str, value: String },
    #[error("'{0}' is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("'{0}' is not a valid identifier (letters, digits and '_' only)")]
    InvalidIdentifier(String),
}

fn parse_id(what: &'static str, raw: &str) -> Result<u64, ParamError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParamError::InvalidId {
            what,
            value: raw.to_string(),
        }),
    }
}

fn positive_id(what: &'static str, id: u64) -> Result<u64, ParamError> {
    if id == 0 {
        return Err(ParamError::InvalidId {
            what,
            value: id.to_string(),
        });
    }
    Ok(id)
}

/// Ad tree node id of a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PlacementId(u64);

impl PlacementId {
    pub fn new(id: u64) -> Result<Self, ParamError> {
        Self::try_from(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for PlacementId {
    type Error = ParamError;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        positive_id("placement id", id).map(Self)
    }
}

impl From<PlacementId> for u64 {
    fn from(id: PlacementId) -> Self {
        id.0
    }
}

impl FromStr for PlacementId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id("placement id", s).map(Self)
    }
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network id; also selects the network's time zone in LQS queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct NetworkId(u64);

impl NetworkId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for NetworkId {
    type Error = ParamError;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        positive_id("network id", id).map(Self)
    }
}

impl From<NetworkId> for u64 {
    fn from(id: NetworkId) -> Self {
        id.0
    }
}

impl FromStr for NetworkId {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_id("network id", s).map(Self)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ParamError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ParamError> {
        if start > end {
            return Err(ParamError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings, as returned by a date picker.
    pub fn parse(start: &str, end: &str) -> Result<Self, ParamError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ParamError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ParamError::InvalidDate(raw.to_string()))
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static identifier regex"))
}

/// A bare word that is safe to place inside a SQL string literal or use as
/// a column keyword.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqlIdentifier(String);

impl SqlIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SqlIdentifier {
    type Error = ParamError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let trimmed = raw.trim();
        if identifier_pattern().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ParamError::InvalidIdentifier(raw))
        }
    }
}

impl From<SqlIdentifier> for String {
    fn from(ident: SqlIdentifier) -> Self {
        ident.0
    }
}

impl FromStr for SqlIdentifier {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_id_parses_trimmed_positive_integer() {
        let id: PlacementId = " 12345 ".parse().unwrap();
        assert_eq!(id.get(), 12345);
        assert_eq!(id.to_string(), "12345");
    }

    #[test]
    fn test_placement_id_rejects_zero_and_text() {
        assert!("0".parse::<PlacementId>().is_err());
        assert!("12; DROP TABLE x".parse::<PlacementId>().is_err());
        assert!("".parse::<PlacementId>().is_err());
    }

    #[test]
    fn test_network_id_error_names_the_field() {
        let err = "abc".parse::<NetworkId>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "'abc' is not a valid network id (expected a positive integer)"
        );
    }

    #[test]
    fn test_date_range_rejects_inverted_dates() {
        assert!(DateRange::parse("2024-03-01", "2024-03-31").is_ok());
        assert!(DateRange::parse("2024-03-01", "2024-03-01").is_ok());
        assert!(matches!(
            DateRange::parse("2024-04-01", "2024-03-01"),
            Err(ParamError::InvertedRange { .. })
        ));
        assert!(matches!(
            DateRange::parse("03/01/2024", "2024-03-01"),
            Err(ParamError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_date_range_deserialize_validates() {
        let ok: DateRange =
            serde_json::from_str(r#"{"start":"2024-01-01","end":"2024-01-31"}"#).unwrap();
        assert_eq!(ok.end().to_string(), "2024-01-31");
        assert!(serde_json::from_str::<DateRange>(r#"{"start":"2024-02-01","end":"2024-01-31"}"#)
            .is_err());
    }

    #[test]
    fn test_identifier_accepts_only_word_characters() {
        assert_eq!(
            "transaction__request".parse::<SqlIdentifier>().unwrap().as_str(),
            "transaction__request"
        );
        assert!("a' OR 1=1 --".parse::<SqlIdentifier>().is_err());
        assert!("two words".parse::<SqlIdentifier>().is_err());
        assert!(serde_json::from_str::<PlacementId>("0").is_err());
    }
}
