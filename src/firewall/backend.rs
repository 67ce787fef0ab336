use super::rule::{RuleSpec, Table};
use crate::error_handling::types::FirewallError;
use log::{debug, error, info};
use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// The narrow interface between synchronization logic and kernel rule state.
///
/// Implementations must not keep rule state of their own: the kernel (or a fake standing in
/// for it) is the only place rules exist.
pub trait PacketFilter: Send + Sync {
    /// Whether an identical rule is currently installed.
    fn rule_exists(&self, rule: &RuleSpec) -> Result<bool, FirewallError>;

    /// Inserts `rule` at the head of its chain.
    fn insert_rule(&self, rule: &RuleSpec) -> Result<(), FirewallError>;

    /// Deletes one instance of `rule`.
    fn delete_rule(&self, rule: &RuleSpec) -> Result<(), FirewallError>;

    /// Drops tracked connections originating from `ip`.
    fn flush_conntrack(&self, ip: IpAddr) -> Result<(), FirewallError>;

    /// Human-readable dump of one chain.
    fn list(&self, table: Table, chain: &str) -> Result<String, FirewallError>;
}

/// `iptables` + `conntrack` implementation.
///
/// Every call resolves the binary on `PATH` first; a missing binary is reported as
/// [`FirewallError::BinaryNotFound`] instead of attempting the spawn.
pub struct IptablesBackend {
    iptables: String,
    conntrack: String,
}

impl IptablesBackend {
    pub fn new(iptables: impl Into<String>, conntrack: impl Into<String>) -> Self {
        Self {
            iptables: iptables.into(),
            conntrack: conntrack.into(),
        }
    }

    /// Returns `true` when the rule management binary can be found.
    pub fn is_available(&self) -> bool {
        let available = resolve_binary(&self.iptables).is_some();
        debug!("{} availability check: {}", self.iptables, available);
        available
    }

    fn iptables_path(&self) -> Result<PathBuf, FirewallError> {
        resolve_binary(&self.iptables).ok_or_else(|| {
            error!("[FIREWALL] '{}' not found on PATH", self.iptables);
            FirewallError::BinaryNotFound(self.iptables.clone())
        })
    }

    fn run_iptables(&self, verb: &[&str], rule: &RuleSpec) -> Result<Output, FirewallError> {
        let bin = self.iptables_path()?;
        let mut cmd = Command::new(&bin);
        cmd.arg("-w")
            .args(["-t", rule.table.as_str()])
            .args(verb)
            .arg(&rule.chain);
        if verb == ["-I"] {
            cmd.arg("1");
        }
        cmd.args(&rule.args);
        let output = cmd.output().map_err(|e| {
            error!("[FIREWALL] Failed to spawn {}: {}", bin.display(), e);
            FirewallError::IoError(e)
        })?;
        Ok(output)
    }

    fn command_line(&self, verb: &str, rule: &RuleSpec) -> String {
        format!(
            "{} -t {} {} {} {}",
            self.iptables,
            rule.table.as_str(),
            verb,
            rule.chain,
            rule.args.join(" ")
        )
    }
}

impl PacketFilter for IptablesBackend {
    fn rule_exists(&self, rule: &RuleSpec) -> Result<bool, FirewallError> {
        let output = self.run_iptables(&["-C"], rule)?;
        // iptables -C: 0 = present, 1 = absent, anything else is a real failure
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            status => Err(command_failed(self.command_line("-C", rule), status, &output)),
        }
    }

    fn insert_rule(&self, rule: &RuleSpec) -> Result<(), FirewallError> {
        let output = self.run_iptables(&["-I"], rule)?;
        if !output.status.success() {
            let err = command_failed(self.command_line("-I", rule), output.status.code(), &output);
            error!("[FIREWALL] {}", err);
            return Err(err);
        }
        info!("[FIREWALL] Executed: {}", self.command_line("-I", rule));
        Ok(())
    }

    fn delete_rule(&self, rule: &RuleSpec) -> Result<(), FirewallError> {
        let output = self.run_iptables(&["-D"], rule)?;
        if !output.status.success() {
            let err = command_failed(self.command_line("-D", rule), output.status.code(), &output);
            error!("[FIREWALL] {}", err);
            return Err(err);
        }
        info!("[FIREWALL] Executed: {}", self.command_line("-D", rule));
        Ok(())
    }

    fn flush_conntrack(&self, ip: IpAddr) -> Result<(), FirewallError> {
        let bin = resolve_binary(&self.conntrack)
            .ok_or_else(|| FirewallError::BinaryNotFound(self.conntrack.clone()))?;
        let ip = ip.to_string();
        let output = Command::new(&bin).args(["-D", "-s", &ip]).output()?;
        // conntrack exits 1 when nothing matched, which is a successful flush for us
        match output.status.code() {
            Some(0) | Some(1) => {
                debug!("[FIREWALL] conntrack entries flushed for {}", ip);
                Ok(())
            }
            status => Err(command_failed(
                format!("{} -D -s {}", self.conntrack, ip),
                status,
                &output,
            )),
        }
    }

    fn list(&self, table: Table, chain: &str) -> Result<String, FirewallError> {
        let bin = self.iptables_path()?;
        let output = Command::new(&bin)
            .args(["-w", "-t", table.as_str(), "-L", chain, "-n", "-v", "--line-numbers"])
            .output()?;
        if !output.status.success() {
            return Err(command_failed(
                format!("{} -t {} -L {}", self.iptables, table.as_str(), chain),
                output.status.code(),
                &output,
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn command_failed(command: String, status: Option<i32>, output: &Output) -> FirewallError {
    FirewallError::CommandFailed {
        command,
        status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Finds `name` the way a shell would: paths are checked directly, bare names are searched
/// in every `PATH` entry.
pub fn resolve_binary(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        return is_executable(path).then(|| path.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
