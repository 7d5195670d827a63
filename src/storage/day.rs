use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CamError;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Calendar-date partition key for all persisted state (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Day(NaiveDate);

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The local calendar day right now.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Strict parse: exactly four-two-two digits, as used for directory names.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        let shape_ok = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shape_ok {
            return None;
        }
        NaiveDate::parse_from_str(s, DAY_FORMAT).ok().map(Self)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}

impl FromStr for Day {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Day::parse(s).ok_or_else(|| CamError::BadRequest(format!("invalid day '{}'", s)))
    }
}

impl TryFrom<String> for Day {
    type Error = CamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Day> for String {
    fn from(day: Day) -> Self {
        day.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_and_display() {
        let day = Day::parse("2024-10-09").unwrap();
        assert_eq!(day.to_string(), "2024-10-09");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(Day::parse("2024-1-09").is_none());
        assert!(Day::parse("20241009").is_none());
        assert!(Day::parse("2024-13-01").is_none());
        assert!(Day::parse("abcd-ef-gh").is_none());
        assert!(Day::parse("../../etc").is_none());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a = Day::parse("2023-12-31").unwrap();
        let b = Day::parse("2024-01-01").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_serde_as_map_key() {
        let mut map = BTreeMap::new();
        map.insert(Day::parse("2024-10-09").unwrap(), 1u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"2024-10-09":1}"#);

        let back: BTreeMap<Day, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
