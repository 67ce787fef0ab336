use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn mac_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}$")
            .unwrap_or_else(|e| panic!("static MAC pattern failed to compile: {}", e))
    })
}

/// Link-layer address, always stored as lowercase colon-separated hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(String);

impl MacAddr {
    /// Parses `AA:BB:CC:DD:EE:FF` or `aa-bb-cc-dd-ee-ff`; returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<MacAddr> {
        let raw = raw.trim();
        if !mac_pattern().is_match(raw) {
            return None;
        }
        Some(MacAddr(raw.replace('-', ":").to_ascii_lowercase()))
    }

    /// `00:00:00:00:00:00` shows up for incomplete neighbor entries.
    pub fn is_zero(&self) -> bool {
        self.0 == "00:00:00:00:00:00"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MacAddr {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MacAddr::parse(&value).ok_or_else(|| format!("invalid MAC address {:?}", value))
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_separator() {
        let mac = MacAddr::parse("AA-BB-CC-DD-EE-0F").unwrap();
        assert_eq!(mac.as_str(), "aa:bb:cc:dd:ee:0f");
        assert_eq!(MacAddr::parse("aa:bb:cc:dd:ee:0f"), Some(mac));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MacAddr::parse("").is_none());
        assert!(MacAddr::parse("aa:bb:cc:dd:ee").is_none());
        assert!(MacAddr::parse("aa:bb:cc:dd:ee:gg").is_none());
        assert!(MacAddr::parse("aa:bb:cc:dd:ee:ff:00").is_none());
    }

    #[test]
    fn test_zero_mac_detected() {
        assert!(MacAddr::parse("00:00:00:00:00:00").unwrap().is_zero());
        assert!(!MacAddr::parse("00:00:00:00:00:01").unwrap().is_zero());
    }

    #[test]
    fn test_serde_rejects_invalid() {
        assert!(serde_json::from_str::<MacAddr>("\"nope\"").is_err());
        let mac: MacAddr = serde_json::from_str("\"AA:BB:CC:DD:EE:FF\"").unwrap();
        assert_eq!(serde_json::to_string(&mac).unwrap(), "\"aa:bb:cc:dd:ee:ff\"");
    }
}
