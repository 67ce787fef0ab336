//! Storage subsystem
//!
//! Persistence for the session table so a restart can rebuild active grants.
//!
//! Components:
//! - `storage_trait`: the `SessionStorage` trait the session store writes through.
//! - `types`: on-disk record shape and timestamp conversion.
//! - `file_storage`: JSON snapshot file with atomic replace.

pub mod file_storage;
pub mod storage_trait;
pub mod types;

pub use file_storage::FileStorage;
pub use storage_trait::SessionStorage;
