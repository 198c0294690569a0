use serde::{Deserialize, Serialize};
use std::fmt;

/// Uppercased, trimmed stock symbol as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Returns `None` for empty or whitespace-only input. Nothing else is validated here; an
    /// unknown symbol only shows up once the provider is asked about it.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_and_trims() {
        let t = Ticker::parse("  tsla ").unwrap();
        assert_eq!(t.as_str(), "TSLA");
        assert_eq!(t.to_string(), "TSLA");
    }

    #[test]
    fn rejects_blank_input() {
        assert!(Ticker::parse("").is_none());
        assert!(Ticker::parse("   \t\n").is_none());
    }

    #[test]
    fn keeps_exchange_suffixes() {
        assert_eq!(Ticker::parse("005930.ks").unwrap().as_str(), "005930.KS");
    }
}
