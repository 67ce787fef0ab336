//! Kernel packet-filter synchronization.
//!
//! A grant opens the forwarding path for one client and exempts it from the portal redirect;
//! a revoke removes both rules and tears down the client's tracked connections.
//!
//! Components:
//! - `rule`: the identity of a rule (`RuleSpec`) independent of how it is applied.
//! - `backend`: the `PacketFilter` seam and the `iptables`/`conntrack` implementation, the only
//!   code that builds command lines.
//! - `synchronizer`: idempotent grant and bounded, repeated revoke on top of any backend.

pub mod backend;
pub mod rule;
pub mod synchronizer;

#[cfg(test)]
pub mod fake_backend;

pub use backend::{IptablesBackend, PacketFilter};
pub use rule::{RuleSpec, Table};
pub use synchronizer::Firewall;
