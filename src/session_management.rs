//! Session management core module.
//!
//! Sessions are the logical side of network access: each one is paired with a firewall
//! grant for its `(ip, mac)` identity for as long as it lives.

/// Submodule for session data structures and keys.
pub mod session;
/// Submodule for the concurrent, persisted session table.
pub mod session_store;


pub use session::{Session, SessionKey};
pub use session_store::SessionStore;
