use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WORKERS: usize = 16;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 65536;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_BACKLOG: u32 = 64;
pub const DEFAULT_LAN_INTERFACE: &str = "eth1";
pub const DEFAULT_INTERCEPT_PORT: u16 = 80;
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SESSIONS_FILE: &str = "config/sessions.json";
pub const DEFAULT_USERS_FILE: &str = "config/users.txt";
pub const DEFAULT_IPTABLES_BIN: &str = "iptables";
pub const DEFAULT_CONNTRACK_BIN: &str = "conntrack";
pub const DEFAULT_MAX_RULE_REMOVALS: usize = 32;

/// Gateway configuration that defines all runtime parameters.
///
/// Every field can be set from the command line, from a `PORTAL_*` environment variable,
/// or from a TOML file loaded with [`Config::from_file`]. Fields that are not provided keep
/// the defaults listed in the constants of this module.
///
/// # Fields Overview
///
/// - `host`/`port`: where the portal listens
/// - `workers`: size of the connection worker pool
/// - `max_request_bytes`: hard cap on bytes read for one request (headers and body)
/// - `read_timeout_ms`: per-read socket timeout so a silent peer cannot pin a worker
/// - `tls_*`: optional TLS termination
/// - `lan_interface`/`intercept_port`: used to build the NAT exemption rule
/// - `session_ttl_secs`: default lifetime of a session; zero or negative never expires
/// - `sessions_file`/`users_file`: persistence and credential files
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the portal binds to.
    #[arg(long, env = "PORTAL_HTTP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port the portal binds to.
    #[arg(long, env = "PORTAL_HTTP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of connections served simultaneously.
    ///
    /// Further connections wait in the kernel accept backlog until a worker frees up.
    #[arg(long, env = "PORTAL_HTTP_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Upper bound on the bytes read for a single request.
    ///
    /// Exceeding it while reading headers aborts the request with a 400. A `Content-Length`
    /// above it is rejected the same way.
    #[arg(long, env = "PORTAL_HTTP_MAX_REQUEST", default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,

    /// Timeout applied to every socket read, in milliseconds.
    #[arg(long, env = "PORTAL_HTTP_READ_TIMEOUT_MS", default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,

    /// Listen backlog handed to the kernel.
    #[arg(long, env = "PORTAL_HTTP_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    pub backlog: u32,

    /// Terminate TLS on the listener.
    ///
    /// Requires `tls_cert` and `tls_key`; startup fails otherwise.
    #[arg(
        long,
        env = "PORTAL_TLS_ENABLED",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub tls_enabled: bool,

    /// PEM certificate chain.
    #[arg(long, env = "PORTAL_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, env = "PORTAL_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Optional cipher suite restriction, `:` or `,` separated suite names.
    #[arg(long, env = "PORTAL_TLS_CIPHERS")]
    pub tls_ciphers: Option<String>,

    /// Minimum TLS protocol version.
    #[arg(long, env = "PORTAL_TLS_MIN_VERSION", value_enum, default_value_t = TlsVersion::Tls12)]
    pub tls_min_version: TlsVersion,

    /// LAN-facing interface whose intercepted traffic is redirected to the portal.
    #[arg(long, env = "PORTAL_LAN_IF", default_value = DEFAULT_LAN_INTERFACE)]
    pub lan_interface: String,

    /// Destination port intercepted by the redirect rule.
    #[arg(long, env = "PORTAL_INTERCEPT_PORT", default_value_t = DEFAULT_INTERCEPT_PORT)]
    pub intercept_port: u16,

    /// Default session lifetime in seconds. Zero or negative means sessions never expire.
    #[arg(
        long,
        env = "PORTAL_SESSION_TTL",
        default_value_t = DEFAULT_SESSION_TTL_SECS,
        allow_hyphen_values = true
    )]
    pub session_ttl_secs: i64,

    /// Interval between expiry sweeps, in seconds. Zero disables the sweeper.
    #[arg(long, env = "PORTAL_SWEEP_INTERVAL", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,

    /// JSON snapshot of active sessions.
    #[arg(long, env = "PORTAL_SESSIONS_FILE", default_value = DEFAULT_SESSIONS_FILE)]
    pub sessions_file: PathBuf,

    /// `username:secret` credentials file.
    #[arg(long, env = "PORTAL_USERS_FILE", default_value = DEFAULT_USERS_FILE)]
    pub users_file: PathBuf,

    /// Directory whose HTML files override the embedded templates.
    #[arg(long, env = "PORTAL_TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Rule management binary.
    #[arg(long, env = "PORTAL_IPTABLES", default_value = DEFAULT_IPTABLES_BIN)]
    pub iptables_bin: String,

    /// Connection tracking binary.
    #[arg(long, env = "PORTAL_CONNTRACK", default_value = DEFAULT_CONNTRACK_BIN)]
    pub conntrack_bin: String,

    /// Bound on repeated deletions of one rule during a revoke.
    #[arg(long, env = "PORTAL_MAX_RULE_REMOVALS", default_value_t = DEFAULT_MAX_RULE_REMOVALS)]
    pub max_rule_removals: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            backlog: DEFAULT_BACKLOG,
            tls_enabled: false,
            tls_cert: None,
            tls_key: None,
            tls_ciphers: None,
            tls_min_version: TlsVersion::default(),
            lan_interface: DEFAULT_LAN_INTERFACE.to_string(),
            intercept_port: DEFAULT_INTERCEPT_PORT,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sessions_file: PathBuf::from(DEFAULT_SESSIONS_FILE),
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
            templates_dir: None,
            iptables_bin: DEFAULT_IPTABLES_BIN.to_string(),
            conntrack_bin: DEFAULT_CONNTRACK_BIN.to_string(),
            max_rule_removals: DEFAULT_MAX_RULE_REMOVALS,
        }
    }
}

impl Config {
    /// Loads a configuration from a TOML file. Keys that are absent keep their defaults.
    ///
    /// The result is not validated; call [`Config::validate`] before using it.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Checks every value that could leave the gateway half-configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue("host must not be empty".into()));
        }
        if self.workers == 0 || u32::try_from(self.workers).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "workers must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_request_bytes must be at least 1".into(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "read_timeout_ms must be at least 1".into(),
            ));
        }
        if self.backlog == 0 {
            return Err(ConfigError::InvalidValue("backlog must be at least 1".into()));
        }
        if self.lan_interface.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "lan_interface must not be empty".into(),
            ));
        }
        if self.max_rule_removals == 0 {
            return Err(ConfigError::InvalidValue(
                "max_rule_removals must be at least 1".into(),
            ));
        }
        if self.iptables_bin.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "iptables_bin must not be empty".into(),
            ));
        }

        if self.tls_enabled {
            let cert = self.tls_cert.as_ref().ok_or_else(|| {
                ConfigError::MissingTlsMaterial("TLS enabled without a certificate".into())
            })?;
            let key = self.tls_key.as_ref().ok_or_else(|| {
                ConfigError::MissingTlsMaterial("TLS enabled without a private key".into())
            })?;
            for (what, path) in [("certificate", cert), ("private key", key)] {
                if !path.is_file() {
                    return Err(ConfigError::MissingTlsMaterial(format!(
                        "{} {} does not exist",
                        what,
                        path.display()
                    )));
                }
            }
            if let Some(list) = &self.tls_ciphers {
                if parse_cipher_list(list).is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "tls_ciphers is set but names no cipher suite".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// `host:port` string for binding.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
