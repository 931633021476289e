//! Window strings: shorthand period tokens normalized to `<n><unit>`.
//!
//! Accepted: an optional integer multiple (default 1) followed by a unit
//! token, case-insensitive, whitespace ignored. "1m", "1 month" and "mo" all
//! canonicalize to "1mo". Canonical strings parse back to themselves.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl WindowUnit {
    fn suffix(self) -> &'static str {
        match self {
            WindowUnit::Day => "d",
            WindowUnit::Week => "w",
            WindowUnit::Month => "mo",
            WindowUnit::Quarter => "q",
            WindowUnit::Year => "y",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        let unit = match token {
            "d" | "day" | "days" => WindowUnit::Day,
            "w" | "wk" | "wks" | "week" | "weeks" => WindowUnit::Week,
            "m" | "mo" | "mos" | "mon" | "month" | "months" => WindowUnit::Month,
            "q" | "qtr" | "quarter" | "quarters" => WindowUnit::Quarter,
            "y" | "yr" | "yrs" | "year" | "years" => WindowUnit::Year,
            _ => return None,
        };
        Some(unit)
    }

    /// Approximate trading sessions per unit.
    pub fn trading_days(self) -> usize {
        match self {
            WindowUnit::Day => 1,
            WindowUnit::Week => 5,
            WindowUnit::Month => 21,
            WindowUnit::Quarter => 63,
            WindowUnit::Year => 252,
        }
    }
}

/// A canonical window such as `1mo` or `2w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    count: u32,
    unit: WindowUnit,
}

impl Window {
    pub fn new(count: u32, unit: WindowUnit) -> Self {
        Self { count, unit }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> WindowUnit {
        self.unit
    }

    /// Length in trading sessions.
    pub fn trading_days(&self) -> usize {
        self.count as usize * self.unit.trading_days()
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(1, WindowUnit::Month)
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if compact.is_empty() {
            return Err("window is empty".into());
        }

        let split = compact
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(compact.len());
        let (digits, token) = compact.split_at(split);

        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| format!("window multiple '{digits}' is out of range"))?
        };
        if count == 0 {
            return Err("window multiple must be at least 1".into());
        }
        if token.is_empty() {
            return Err(format!("window '{s}' has no unit"));
        }

        let unit = WindowUnit::from_token(token)
            .ok_or_else(|| format!("unknown window unit '{token}'"))?;
        Ok(Self::new(count, unit))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl Serialize for Window {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonicalize a window string.
pub fn canonicalize(s: &str) -> Result<String, String> {
    s.parse::<Window>().map(|w| w.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_tokens_canonicalize() {
        assert_eq!(canonicalize("1d").unwrap(), "1d");
        assert_eq!(canonicalize("2w").unwrap(), "2w");
        assert_eq!(canonicalize("1m").unwrap(), "1mo");
        assert_eq!(canonicalize("1mo").unwrap(), "1mo");
        assert_eq!(canonicalize("1y").unwrap(), "1y");
        assert_eq!(canonicalize("3 Months").unwrap(), "3mo");
        assert_eq!(canonicalize("quarter").unwrap(), "1q");
        assert_eq!(canonicalize(" 10 days ").unwrap(), "10d");
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        for s in ["1d", "5d", "2w", "1mo", "6mo", "1q", "1y", "3y"] {
            assert_eq!(canonicalize(s).unwrap(), s);
        }
    }

    #[test]
    fn rejects_bad_windows() {
        assert!(canonicalize("").is_err());
        assert!(canonicalize("0d").is_err());
        assert!(canonicalize("12").is_err());
        assert!(canonicalize("1fortnight").is_err());
        assert!(canonicalize("99999999999d").is_err());
    }

    #[test]
    fn lengths() {
        let w: Window = "2w".parse().unwrap();
        assert_eq!(w.trading_days(), 10);
        assert_eq!(Window::default().trading_days(), 21);
    }

    #[test]
    fn serializes_as_canonical_string() {
        let w: Window = "1 year".parse().unwrap();
        assert_eq!(serde_json::to_string(&w).unwrap(), "\"1y\"");
    }
}
