use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Inclusive range of ports, `start..=end`, both in 1..=65535.
///
/// A single port is a range with `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Parses `PORT` or `START-END`.
    ///
    /// Reversed ranges and missing bounds (`9090-`, `-9090`) are rejected
    /// rather than defaulted.
    pub fn parse(range_str: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidRange(range_str.to_string());

        let (start, end) = match range_str.split_once('-') {
            Some((start, end)) => (
                parse_port(start).ok_or_else(invalid)?,
                parse_port(end).ok_or_else(invalid)?,
            ),
            None => {
                let port = parse_port(range_str).ok_or_else(invalid)?;
                (port, port)
            }
        };

        Self::new(start, end).map_err(|_| invalid())
    }

    pub fn new(start: u16, end: u16) -> Result<Self, ParseError> {
        if start == 0 || start > end {
            return Err(ParseError::InvalidRange(format!("{}-{}", start, end)));
        }
        Ok(PortRange { start, end })
    }

    pub fn single(port: u16) -> Result<Self, ParseError> {
        Self::new(port, port)
    }

    /// Builds the block of `len` ports starting at `start`, if it fits below 65536.
    pub fn with_len(start: u16, len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let end = usize::from(start) + len - 1;
        let end = u16::try_from(end).ok()?;
        Self::new(start, end).ok()
    }

    pub fn len(&self) -> usize {
        usize::from(self.end) - usize::from(self.start) + 1
    }

    /// Always false: a valid range holds at least one port.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_range() {
        let range = PortRange::parse("3000-3009").unwrap();
        assert_eq!(range.start, 3000);
        assert_eq!(range.end, 3009);
        assert_eq!(range.len(), 10);
    }

    #[test]
    fn test_parse_single_port() {
        let range = PortRange::parse("80").unwrap();
        assert!(range.is_single());
        assert_eq!(range.len(), 1);
        assert_eq!(range.to_string(), "80");
    }

    #[test]
    fn test_parse_invalid_ranges() {
        for bad in ["9090-9089", "9090-", "-9090", "", "0", "65536", "1-2-3", "+80", "8o", "0-10"] {
            assert_eq!(
                PortRange::parse(bad),
                Err(ParseError::InvalidRange(bad.to_string())),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_full_port_space() {
        let range = PortRange::parse("1-65535").unwrap();
        assert_eq!(range.len(), 65535);
        assert_eq!(range.ports().last(), Some(65535));
    }

    #[test]
    fn test_with_len() {
        assert_eq!(PortRange::with_len(9800, 4), PortRange::new(9800, 9803).ok());
        assert_eq!(PortRange::with_len(65535, 1), PortRange::new(65535, 65535).ok());
        assert_eq!(PortRange::with_len(65535, 2), None);
        assert_eq!(PortRange::with_len(100, 0), None);
    }

    #[test]
    fn test_contains() {
        let range3 = PortRange::new(3010, 3019).unwrap();
        assert!(range3.contains(3010));
        assert!(!range3.contains(3009));
        assert!(range3.contains(3019));
        assert!(!range3.contains(3020));
    }
}
