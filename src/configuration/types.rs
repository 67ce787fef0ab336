use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lowest TLS protocol version the listener will negotiate.
#[derive(Debug, PartialEq, Eq, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum TlsVersion {
    #[value(name = "1.2")]
    #[serde(rename = "1.2")]
    Tls12,
    #[value(name = "1.3")]
    #[serde(rename = "1.3")]
    Tls13,
}

impl Default for TlsVersion {
    fn default() -> Self {
        TlsVersion::Tls12
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsVersion::Tls12 => write!(f, "TLSv1.2"),
            TlsVersion::Tls13 => write!(f, "TLSv1.3"),
        }
    }
}

/// Splits an operator cipher restriction such as `"TLS13_AES_256_GCM_SHA384:TLS13_CHACHA20_POLY1305_SHA256"`
/// into normalized suite names. Both `:` and `,` separate entries.
pub fn parse_cipher_list(list: &str) -> Vec<String> {
    list.split([':', ','])
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cipher_list_mixed_separators() {
        let parsed = parse_cipher_list(" tls13_aes_256_gcm_sha384 :TLS13_CHACHA20_POLY1305_SHA256,,");
        assert_eq!(
            parsed,
            vec![
                "TLS13_AES_256_GCM_SHA384".to_string(),
                "TLS13_CHACHA20_POLY1305_SHA256".to_string()
            ]
        );
    }

    #[test]
    fn test_tls_version_from_toml_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            v: TlsVersion,
        }
        let w: Wrapper = toml::from_str("v = \"1.3\"").unwrap();
        assert_eq!(w.v, TlsVersion::Tls13);
    }
}
