use crate::session_management::session::{Session, SessionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk form of one session. Times are floating-point Unix seconds.
///
/// The key the record is stored under is authoritative for `ip` and `mac`; the copies
/// inside the record are informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub username: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    pub login_time: f64,
    #[serde(default)]
    pub expires_at: Option<f64>,
}

impl SessionRecord {
    pub fn from_session(session: &Session) -> Self {
        Self {
            username: session.username.clone(),
            ip: Some(session.ip.to_string()),
            mac: session.mac.as_ref().map(|m| m.to_string()),
            login_time: to_unix_seconds(session.login_time),
            expires_at: session.expires_at.map(to_unix_seconds),
        }
    }

    /// Rebuilds a session for `key`; `None` when the username is blank or a timestamp is
    /// out of range.
    pub fn into_session(self, key: SessionKey) -> Option<Session> {
        if self.username.trim().is_empty() {
            return None;
        }
        let login_time = from_unix_seconds(self.login_time)?;
        let expires_at = match self.expires_at {
            Some(secs) => Some(from_unix_seconds(secs)?),
            None => None,
        };
        Some(Session {
            username: self.username,
            ip: key.ip,
            mac: key.mac,
            login_time,
            expires_at,
        })
    }
}

pub fn to_unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1_000_000.0
}

pub fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}
