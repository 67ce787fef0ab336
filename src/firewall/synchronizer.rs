use super::backend::PacketFilter;
use super::rule::{RuleSpec, Table};
use crate::error_handling::types::FirewallError;
use crate::network::types::MacAddr;
use log::{debug, error, info, warn};
use std::net::IpAddr;
use std::sync::Arc;

/// Keeps kernel rules in step with session state.
///
/// Every authorized client owns exactly two rules: a `FORWARD` accept and a `nat PREROUTING`
/// exemption from the portal redirect. Both are keyed by IP and, when known, MAC.
pub struct Firewall {
    backend: Arc<dyn PacketFilter>,
    lan_interface: String,
    intercept_port: u16,
    max_removals: usize,
}

impl Firewall {
    pub fn new(
        backend: Arc<dyn PacketFilter>,
        lan_interface: impl Into<String>,
        intercept_port: u16,
        max_removals: usize,
    ) -> Self {
        Self {
            backend,
            lan_interface: lan_interface.into(),
            intercept_port,
            max_removals,
        }
    }

    /// The two rules a client with this identity owns.
    pub fn rules_for(&self, ip: IpAddr, mac: Option<&MacAddr>) -> [RuleSpec; 2] {
        [
            RuleSpec::forward_accept(ip, mac),
            RuleSpec::nat_exemption(ip, mac, &self.lan_interface, self.intercept_port),
        ]
    }

    /// Installs any missing rule for the client. Rules already present are left alone, so
    /// repeated grants never create duplicates.
    ///
    /// Both rules are attempted even if the first fails; the first error is returned.
    /// Returns the number of rules actually inserted.
    pub fn grant(&self, ip: IpAddr, mac: Option<&MacAddr>) -> Result<usize, FirewallError> {
        let mut inserted = 0;
        let mut first_err = None;

        for rule in self.rules_for(ip, mac) {
            match self.ensure_present(&rule) {
                Ok(true) => inserted += 1,
                Ok(false) => debug!("[FIREWALL] Rule already present: {}", rule),
                Err(e) => {
                    error!("[FIREWALL] Failed to install '{}': {}", rule, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                info!(
                    "[FIREWALL] Access granted for {} ({}), {} rule(s) inserted",
                    ip,
                    mac.map_or("no MAC".to_string(), |m| m.to_string()),
                    inserted
                );
                Ok(inserted)
            }
        }
    }

    /// Removes every copy of the client's rules, then drops its tracked connections so open
    /// flows do not outlive the authorization.
    ///
    /// Returns the number of rule instances removed.
    pub fn revoke(&self, ip: IpAddr, mac: Option<&MacAddr>) -> Result<usize, FirewallError> {
        let mut removed = 0;
        let mut first_err = None;

        for rule in self.rules_for(ip, mac) {
            match self.remove_all(&rule) {
                Ok(count) => removed += count,
                Err(e) => {
                    error!("[FIREWALL] Failed to remove '{}': {}", rule, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match self.backend.flush_conntrack(ip) {
            Ok(()) => {}
            Err(FirewallError::BinaryNotFound(bin)) => {
                warn!("[FIREWALL] '{}' not found; existing flows for {} stay open", bin, ip)
            }
            Err(e) => {
                warn!("[FIREWALL] Connection tracking flush failed for {}: {}", ip, e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                info!("[FIREWALL] Access revoked for {}, {} rule(s) removed", ip, removed);
                Ok(removed)
            }
        }
    }

    /// Current `FORWARD` and `nat PREROUTING` chains, for operators.
    pub fn list(&self) -> Result<String, FirewallError> {
        let forward = self.backend.list(Table::Filter, "FORWARD")?;
        let prerouting = self.backend.list(Table::Nat, "PREROUTING")?;
        Ok(format!(
            "# filter FORWARD\n{}\n# nat PREROUTING\n{}\n",
            forward.trim_end(),
            prerouting.trim_end()
        ))
    }

    fn ensure_present(&self, rule: &RuleSpec) -> Result<bool, FirewallError> {
        if self.backend.rule_exists(rule)? {
            return Ok(false);
        }
        self.backend.insert_rule(rule)?;
        Ok(true)
    }

    fn remove_all(&self, rule: &RuleSpec) -> Result<usize, FirewallError> {
        let mut removed = 0;
        while removed < self.max_removals {
            if !self.backend.rule_exists(rule)? {
                return Ok(removed);
            }
            self.backend.delete_rule(rule)?;
            removed += 1;
        }

        if self.backend.rule_exists(rule)? {
            return Err(FirewallError::RemovalLimitReached {
                rule: rule.to_string(),
                attempts: removed,
            });
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::fake_backend::FakePacketFilter;

    fn firewall(backend: Arc<FakePacketFilter>) -> Firewall {
        Firewall::new(backend, "eth1", 80, 32)
    }

    fn client() -> (IpAddr, MacAddr) {
        (
            "10.0.2.15".parse().unwrap(),
            MacAddr::parse("aa:bb:cc:dd:ee:ff").unwrap(),
        )
    }

    #[test]
    fn test_grant_is_idempotent() {
        let backend = Arc::new(FakePacketFilter::new());
        let fw = firewall(backend.clone());
        let (ip, mac) = client();

        assert_eq!(fw.grant(ip, Some(&mac)).unwrap(), 2);
        assert_eq!(fw.grant(ip, Some(&mac)).unwrap(), 0);
        assert_eq!(fw.grant(ip, Some(&mac)).unwrap(), 0);

        let [forward, nat] = fw.rules_for(ip, Some(&mac));
        assert_eq!(backend.count(&forward), 1);
        assert_eq!(backend.count(&nat), 1);
        assert_eq!(backend.total(), 2);
    }

    #[test]
    fn test_revoke_removes_every_duplicate() {
        let backend = Arc::new(FakePacketFilter::new());
        let fw = firewall(backend.clone());
        let (ip, mac) = client();
        let [forward, nat] = fw.rules_for(ip, Some(&mac));
        for _ in 0..3 {
            backend.push_raw(forward.clone());
        }
        backend.push_raw(nat.clone());

        assert_eq!(fw.revoke(ip, Some(&mac)).unwrap(), 4);
        assert_eq!(backend.total(), 0);
        assert_eq!(backend.flushed(), vec![ip]);
    }

    #[test]
    fn test_revoke_without_rules_still_flushes() {
        let backend = Arc::new(FakePacketFilter::new());
        let fw = firewall(backend.clone());
        let (ip, _) = client();

        assert_eq!(fw.revoke(ip, None).unwrap(), 0);
        assert_eq!(backend.flushed(), vec![ip]);
    }

    #[test]
    fn test_revoke_leaves_other_identities() {
        let backend = Arc::new(FakePacketFilter::new());
        let fw = firewall(backend.clone());
        let (ip, mac) = client();
        fw.grant(ip, Some(&mac)).unwrap();
        fw.grant(ip, None).unwrap();

        fw.revoke(ip, None).unwrap();
        let [forward, nat] = fw.rules_for(ip, Some(&mac));
        assert_eq!(backend.count(&forward), 1);
        assert_eq!(backend.count(&nat), 1);
        assert_eq!(backend.total(), 2);
    }

    #[test]
    fn test_revoke_is_bounded() {
        let backend = Arc::new(FakePacketFilter::stuck());
        let fw = Firewall::new(backend.clone(), "eth1", 80, 5);
        let (ip, _) = client();
        fw.grant(ip, None).unwrap();

        match fw.revoke(ip, None).unwrap_err() {
            FirewallError::RemovalLimitReached { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(backend.flushed(), vec![ip]);
    }

    #[test]
    fn test_missing_conntrack_is_not_fatal() {
        let backend = Arc::new(FakePacketFilter::without_conntrack());
        let fw = firewall(backend.clone());
        let (ip, mac) = client();
        fw.grant(ip, Some(&mac)).unwrap();

        assert_eq!(fw.revoke(ip, Some(&mac)).unwrap(), 2);
        assert_eq!(backend.total(), 0);
    }

    #[test]
    fn test_backend_failure_is_reported() {
        let backend = Arc::new(FakePacketFilter::broken());
        let fw = firewall(backend);
        let (ip, _) = client();

        assert!(matches!(
            fw.grant(ip, None),
            Err(FirewallError::CommandFailed { .. })
        ));
        assert!(matches!(
            fw.revoke(ip, None),
            Err(FirewallError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_list_covers_both_chains() {
        let backend = Arc::new(FakePacketFilter::new());
        let fw = firewall(backend);
        let (ip, _) = client();
        fw.grant(ip, None).unwrap();

        let listing = fw.list().unwrap();
        assert!(listing.contains("# filter FORWARD"));
        assert!(listing.contains("-t filter FORWARD -s 10.0.2.15 -j ACCEPT"));
        assert!(listing.contains("# nat PREROUTING"));
        assert!(listing.contains("--dport 80"));
    }
}
