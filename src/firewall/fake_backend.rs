//! In-memory `PacketFilter` for tests. Keeps an ordered rule list so duplicates can exist,
//! exactly like a real chain.

use super::backend::PacketFilter;
use super::rule::{RuleSpec, Table};
use crate::error_handling::types::FirewallError;
use std::net::IpAddr;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakePacketFilter {
    rules: Mutex<Vec<RuleSpec>>,
    flushed: Mutex<Vec<IpAddr>>,
    inserts: Mutex<usize>,
    stuck_deletes: bool,
    broken: bool,
    no_conntrack: bool,
}

impl FakePacketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every rule operation fails with `CommandFailed`.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// `delete_rule` reports success but leaves the rule in place.
    pub fn stuck() -> Self {
        Self {
            stuck_deletes: true,
            ..Self::default()
        }
    }

    /// `flush_conntrack` reports a missing binary.
    pub fn without_conntrack() -> Self {
        Self {
            no_conntrack: true,
            ..Self::default()
        }
    }

    pub fn count(&self, rule: &RuleSpec) -> usize {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| *r == rule)
            .count()
    }

    pub fn total(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    pub fn inserts(&self) -> usize {
        *self.inserts.lock().unwrap()
    }

    pub fn flushed(&self) -> Vec<IpAddr> {
        self.flushed.lock().unwrap().clone()
    }

    /// Installs a rule behind the synchronizer's back, e.g. a leftover duplicate.
    pub fn push_raw(&self, rule: RuleSpec) {
        self.rules.lock().unwrap().push(rule);
    }

    fn check_broken(&self, verb: &str, rule: &RuleSpec) -> Result<(), FirewallError> {
        if self.broken {
            return Err(FirewallError::CommandFailed {
                command: format!("fake {} {}", verb, rule),
                status: Some(4),
                stderr: "resource temporarily unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl PacketFilter for FakePacketFilter {
    fn rule_exists(&self, rule: &RuleSpec) -> Result<bool, FirewallError> {
        self.check_broken("-C", rule)?;
        Ok(self.count(rule) > 0)
    }

    fn insert_rule(&self, rule: &RuleSpec) -> Result<(), FirewallError> {
        self.check_broken("-I", rule)?;
        self.rules.lock().unwrap().insert(0, rule.clone());
        *self.inserts.lock().unwrap() += 1;
        Ok(())
    }

    fn delete_rule(&self, rule: &RuleSpec) -> Result<(), FirewallError> {
        self.check_broken("-D", rule)?;
        if self.stuck_deletes {
            return Ok(());
        }
        let mut rules = self.rules.lock().unwrap();
        if let Some(pos) = rules.iter().position(|r| r == rule) {
            rules.remove(pos);
        }
        Ok(())
    }

    fn flush_conntrack(&self, ip: IpAddr) -> Result<(), FirewallError> {
        if self.no_conntrack {
            return Err(FirewallError::BinaryNotFound("conntrack".to_string()));
        }
        self.flushed.lock().unwrap().push(ip);
        Ok(())
    }

    fn list(&self, table: Table, chain: &str) -> Result<String, FirewallError> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.table == table && r.chain == chain)
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
