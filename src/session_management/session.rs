use crate::network::types::MacAddr;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::fmt;
use std::net::IpAddr;

/// Identity a session is stored under: client IP plus MAC when one was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub ip: IpAddr,
    pub mac: Option<MacAddr>,
}

impl SessionKey {
    pub fn new(ip: IpAddr, mac: Option<MacAddr>) -> Self {
        Self { ip, mac }
    }

    /// Parses the snapshot form `"<ip>|<mac-or-empty>"`.
    pub fn parse(raw: &str) -> Option<SessionKey> {
        let (ip, mac) = raw.split_once('|')?;
        let ip = ip.trim().parse().ok()?;
        let mac = match mac.trim() {
            "" => None,
            other => Some(MacAddr::parse(other)?),
        };
        Some(SessionKey { ip, mac })
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mac {
            Some(mac) => write!(f, "{}|{}", self.ip, mac),
            None => write!(f, "{}|", self.ip),
        }
    }
}

/// One granted access window.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub username: String,
    pub ip: IpAddr,
    pub mac: Option<MacAddr>,
    pub login_time: DateTime<Utc>,
    /// `None` means the session never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Builds a session starting at `now`. A non-positive `ttl_secs` never expires.
    ///
    /// Times are kept at microsecond precision, the resolution of the snapshot file.
    pub fn new(
        username: impl Into<String>,
        ip: IpAddr,
        mac: Option<MacAddr>,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(6);
        let expires_at = (ttl_secs > 0)
            .then(|| Duration::try_seconds(ttl_secs).and_then(|ttl| now.checked_add_signed(ttl)))
            .flatten();
        Self {
            username: username.into(),
            ip,
            mac,
            login_time: now,
            expires_at,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.ip, self.mac.clone())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mac = self.mac.as_ref().map_or("-".to_string(), |m| m.to_string());
        let expires = self
            .expires_at
            .map_or("never".to_string(), |t| t.to_rfc3339());
        write!(
            f,
            "{} {} {} since {} expires {}",
            self.username,
            self.ip,
            mac,
            self.login_time.to_rfc3339(),
            expires
        )
    }
}
