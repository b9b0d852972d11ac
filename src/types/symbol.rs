use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading pair identifier (e.g. "BTCUSDT")
///
/// Positions are keyed by symbol, so equality is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol from a string
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbols are blank when empty or whitespace-only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_symbol_blank() {
        assert!(Symbol::new("").is_blank());
        assert!(Symbol::new("   ").is_blank());
        assert!(!Symbol::new("ETHUSDT").is_blank());
    }

    #[test]
    fn test_symbol_map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(Symbol::new("BTCUSDT"), 1);
        assert_eq!(map.get("BTCUSDT"), Some(&1));
        assert_eq!(map.get("btcusdt"), None);
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("BTCUSDT");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BTCUSDT\"");

        let deserialized: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, symbol);
    }
}
