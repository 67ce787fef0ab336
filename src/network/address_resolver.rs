//! Best-effort IP to MAC resolution through the kernel neighbor table.
//!
//! Resolution never fails loudly: every problem is logged and reported as "no MAC",
//! and the caller falls back to an IP-only grant.

use super::types::MacAddr;
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

fn embedded_mac() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}")
            .unwrap_or_else(|e| panic!("static MAC pattern failed to compile: {}", e))
    })
}

/// Maps a client IP to its link-layer address.
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> Option<MacAddr>;
}

/// Queries `ip neigh show <ip>` first, then falls back to `/proc/net/arp`.
pub struct NeighborTableResolver {
    ip_bin: String,
    arp_table: PathBuf,
}

impl NeighborTableResolver {
    pub fn new() -> Self {
        Self {
            ip_bin: "ip".to_string(),
            arp_table: PathBuf::from("/proc/net/arp"),
        }
    }

    fn from_ip_neigh(&self, ip: IpAddr) -> Option<MacAddr> {
        let output = match Command::new(&self.ip_bin)
            .args(["neigh", "show", &ip.to_string()])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("'{} neigh' unavailable: {}", self.ip_bin, e);
                return None;
            }
        };
        if !output.status.success() {
            debug!("'{} neigh show {}' exited with {}", self.ip_bin, ip, output.status);
            return None;
        }
        parse_ip_neigh_output(&String::from_utf8_lossy(&output.stdout), ip)
    }

    fn from_arp_table(&self, ip: IpAddr) -> Option<MacAddr> {
        match fs::read_to_string(&self.arp_table) {
            Ok(content) => parse_proc_arp(&content, ip),
            Err(e) => {
                debug!("Unable to read {}: {}", self.arp_table.display(), e);
                None
            }
        }
    }
}

impl Default for NeighborTableResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressResolver for NeighborTableResolver {
    fn resolve(&self, ip: IpAddr) -> Option<MacAddr> {
        let mac = usable_or_else(self.from_ip_neigh(ip), || self.from_arp_table(ip));
        match &mac {
            Some(mac) => debug!("Resolved {} to {}", ip, mac),
            None => warn!("No MAC address found for {}; falling back to IP-only access", ip),
        }
        mac
    }
}

/// `primary` unless it is missing or the zero MAC of an incomplete entry, then `fallback`
/// under the same rule.
fn usable_or_else<F>(primary: Option<MacAddr>, fallback: F) -> Option<MacAddr>
where
    F: FnOnce() -> Option<MacAddr>,
{
    primary
        .filter(|mac| !mac.is_zero())
        .or_else(|| fallback().filter(|mac| !mac.is_zero()))
}

/// Resolver that never finds anything. Used when MAC pinning is not wanted.
pub struct NoopResolver;

impl AddressResolver for NoopResolver {
    fn resolve(&self, _ip: IpAddr) -> Option<MacAddr> {
        None
    }
}

/// Picks the MAC from the first `ip neigh` line whose destination is exactly `ip`.
pub fn parse_ip_neigh_output(out: &str, ip: IpAddr) -> Option<MacAddr> {
    let wanted = ip.to_string();
    out.lines()
        .filter(|line| line.split_whitespace().next() == Some(wanted.as_str()))
        .find_map(|line| embedded_mac().find(line))
        .and_then(|m| MacAddr::parse(m.as_str()))
}

/// Reads `/proc/net/arp`: header line, then `IP HWtype Flags HWaddress Mask Device`.
pub fn parse_proc_arp(content: &str, ip: IpAddr) -> Option<MacAddr> {
    let wanted = ip.to_string();
    content
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|parts| parts.len() >= 4 && parts[0] == wanted)
        .find_map(|parts| MacAddr::parse(parts[3]))
}
