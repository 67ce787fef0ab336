use crate::error_handling::types::SessionError;
use crate::firewall::Firewall;
use crate::network::types::MacAddr;
use crate::session_management::session::{Session, SessionKey};
use crate::storage::SessionStorage;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The authoritative table of who currently has network access.
///
/// Every mutation runs entirely under one lock: table update, snapshot write and the
/// matching firewall grant or revoke. Callers that see a mutation return have also seen
/// its persistence and firewall side effects attempted.
///
/// # Fields Overview
///
/// - `sessions`: in-memory table keyed by `(ip, mac)`
/// - `storage`: snapshot written after every mutation
/// - `firewall`: rule synchronizer driven by every creation and removal
/// - `default_ttl_secs`: lifetime used when `create` gets no explicit TTL
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionKey, Session>>,
    storage: Arc<dyn SessionStorage>,
    firewall: Arc<Firewall>,
    default_ttl_secs: i64,
}

impl SessionStore {
    /// Restores the persisted table and re-derives kernel state from it.
    pub fn open(
        storage: Arc<dyn SessionStorage>,
        firewall: Arc<Firewall>,
        default_ttl_secs: i64,
    ) -> Self {
        Self::open_at(storage, firewall, default_ttl_secs, Utc::now())
    }

    /// Like [`SessionStore::open`], treating `now` as the current time.
    ///
    /// Entries already expired are revoked and dropped; every survivor is granted again.
    pub fn open_at(
        storage: Arc<dyn SessionStorage>,
        firewall: Arc<Firewall>,
        default_ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let store = Self {
            sessions: Mutex::new(HashMap::new()),
            storage,
            firewall,
            default_ttl_secs,
        };

        let loaded = match store.storage.load_all() {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Unable to restore sessions, starting empty: {}", e);
                Vec::new()
            }
        };

        let mut sessions = store.lock();
        let mut pruned = 0;
        for session in loaded {
            if session.is_expired(now) {
                debug!("Dropping session {} expired before load", session.key());
                store.revoke(&session);
                pruned += 1;
                continue;
            }
            sessions.insert(session.key(), session);
        }
        for session in sessions.values() {
            store.grant(session);
        }
        if pruned > 0 {
            store.persist(&sessions);
        }
        info!(
            "Restored {} active session(s), {} expired entr{} dropped",
            sessions.len(),
            pruned,
            if pruned == 1 { "y" } else { "ies" }
        );
        drop(sessions);

        store
    }

    /// Creates or replaces the session for `(ip, mac)` and grants it.
    ///
    /// `ttl_secs` of `None` uses the configured default; a non-positive TTL never expires.
    pub fn create(
        &self,
        username: &str,
        ip: IpAddr,
        mac: Option<MacAddr>,
        ttl_secs: Option<i64>,
    ) -> Result<Session, SessionError> {
        self.create_at(username, ip, mac, ttl_secs, Utc::now())
    }

    pub fn create_at(
        &self,
        username: &str,
        ip: IpAddr,
        mac: Option<MacAddr>,
        ttl_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionError> {
        if username.trim().is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        let session = Session::new(username, ip, mac, ttl, now);

        let mut sessions = self.lock();
        let replaced = sessions.insert(session.key(), session.clone()).is_some();
        info!(
            "{} session for {} (user={}, ttl={})",
            if replaced { "Replaced" } else { "Created" },
            session.key(),
            session.username,
            ttl
        );
        self.persist(&sessions);
        self.grant(&session);

        Ok(session)
    }

    /// Looks up `(ip, mac)`. An expired entry is removed and revoked on the way.
    pub fn get(&self, ip: IpAddr, mac: Option<&MacAddr>) -> Option<Session> {
        self.get_at(ip, mac, Utc::now())
    }

    pub fn get_at(&self, ip: IpAddr, mac: Option<&MacAddr>, now: DateTime<Utc>) -> Option<Session> {
        let key = SessionKey::new(ip, mac.cloned());
        let mut sessions = self.lock();

        let expired = sessions.get(&key)?.is_expired(now);
        if !expired {
            return sessions.get(&key).cloned();
        }

        if let Some(session) = sessions.remove(&key) {
            info!("Session {} expired (user={})", key, session.username);
            self.persist(&sessions);
            self.revoke(&session);
        }
        None
    }

    /// Removes the session at exactly `(ip, mac)`. Returns whether one existed.
    pub fn remove(&self, ip: IpAddr, mac: Option<&MacAddr>) -> bool {
        let key = SessionKey::new(ip, mac.cloned());
        let mut sessions = self.lock();

        match sessions.remove(&key) {
            Some(session) => {
                info!("Removed session {} (user={})", key, session.username);
                self.persist(&sessions);
                self.revoke(&session);
                true
            }
            None => false,
        }
    }

    /// Removes every session for `ip`, whatever its MAC.
    ///
    /// The persisted table is merged in first so sessions created by another process
    /// instance are removed as well.
    pub fn remove_by_ip(&self, ip: IpAddr) -> usize {
        self.remove_by_ip_at(ip, Utc::now())
    }

    pub fn remove_by_ip_at(&self, ip: IpAddr, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();

        match self.storage.load_all() {
            Ok(on_disk) => {
                for session in on_disk {
                    if session.is_expired(now) || sessions.contains_key(&session.key()) {
                        continue;
                    }
                    debug!("Adopting persisted session {}", session.key());
                    self.grant(&session);
                    sessions.insert(session.key(), session);
                }
            }
            Err(e) => warn!("Unable to reload sessions before removal by IP: {}", e),
        }

        let keys: Vec<SessionKey> = sessions.keys().filter(|k| k.ip == ip).cloned().collect();
        let removed: Vec<Session> = keys.iter().filter_map(|k| sessions.remove(k)).collect();
        if removed.is_empty() {
            debug!("No session to remove for {}", ip);
            return 0;
        }

        self.persist(&sessions);
        for session in &removed {
            self.revoke(session);
        }
        info!("Removed {} session(s) for {}", removed.len(), ip);
        removed.len()
    }

    /// Removes and revokes every expired session. The snapshot is written at most once.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();

        let expired: Vec<SessionKey> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let removed: Vec<Session> = expired.iter().filter_map(|k| sessions.remove(k)).collect();
        if removed.is_empty() {
            return 0;
        }

        self.persist(&sessions);
        for session in &removed {
            self.revoke(session);
        }
        info!("Swept {} expired session(s)", removed.len());
        removed.len()
    }

    /// Read-only copy of the table, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<SessionKey, Session> {
        self.lock()
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated: every mutation is a
    // single insert or remove done before any fallible work.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, sessions: &HashMap<SessionKey, Session>) {
        let all: Vec<&Session> = sessions.values().collect();
        if let Err(e) = self.storage.save_all(&all) {
            error!("Session snapshot not written, in-memory table stays authoritative: {}", e);
        }
    }

    fn grant(&self, session: &Session) {
        if let Err(e) = self.firewall.grant(session.ip, session.mac.as_ref()) {
            error!("Firewall grant not applied for {}: {}", session.key(), e);
        }
    }

    fn revoke(&self, session: &Session) {
        if let Err(e) = self.firewall.revoke(session.ip, session.mac.as_ref()) {
            error!("Firewall revoke not applied for {}: {}", session.key(), e);
        }
    }
}
