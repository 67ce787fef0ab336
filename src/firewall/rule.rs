use crate::network::types::MacAddr;
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Filter,
    Nat,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Filter => "filter",
            Table::Nat => "nat",
        }
    }
}

/// One packet-filter rule: where it lives and what it matches, without the verb
/// (`insert`, `check`, `delete`) used to apply it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSpec {
    pub table: Table,
    pub chain: String,
    pub args: Vec<String>,
}

impl RuleSpec {
    /// `FORWARD` rule accepting everything sourced from the client.
    pub fn forward_accept(ip: IpAddr, mac: Option<&MacAddr>) -> Self {
        let mut args = vec!["-s".to_string(), ip.to_string()];
        push_mac_match(&mut args, mac);
        args.extend(["-j".to_string(), "ACCEPT".to_string()]);
        Self {
            table: Table::Filter,
            chain: "FORWARD".to_string(),
            args,
        }
    }

    /// `nat PREROUTING` rule that lets the client's intercepted traffic bypass the portal
    /// redirect further down the chain.
    pub fn nat_exemption(
        ip: IpAddr,
        mac: Option<&MacAddr>,
        lan_interface: &str,
        intercept_port: u16,
    ) -> Self {
        let mut args = vec![
            "-i".to_string(),
            lan_interface.to_string(),
            "-p".to_string(),
            "tcp".to_string(),
            "--dport".to_string(),
            intercept_port.to_string(),
            "-s".to_string(),
            ip.to_string(),
        ];
        push_mac_match(&mut args, mac);
        args.extend(["-j".to_string(), "ACCEPT".to_string()]);
        Self {
            table: Table::Nat,
            chain: "PREROUTING".to_string(),
            args,
        }
    }
}

fn push_mac_match(args: &mut Vec<String>, mac: Option<&MacAddr>) {
    if let Some(mac) = mac {
        args.extend([
            "-m".to_string(),
            "mac".to_string(),
            "--mac-source".to_string(),
            mac.to_string(),
        ]);
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-t {} {} {}", self.table.as_str(), self.chain, self.args.join(" "))
    }
}
