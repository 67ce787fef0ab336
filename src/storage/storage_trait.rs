//! Storage Trait
//!
//! Defines the `SessionStorage` trait, the persistence seam behind the session store.
//!
//! Implementors are responsible for:
//! - Writing a complete snapshot of the session table
//! - Reading the last snapshot back, skipping entries that cannot be decoded
//!
//! A missing snapshot is an empty table, not an error.

use crate::error_handling::types::StorageError;
use crate::session_management::session::Session;

pub trait SessionStorage: Send + Sync {
    /// Returns every decodable session of the last snapshot, expired ones included.
    fn load_all(&self) -> Result<Vec<Session>, StorageError>;

    /// Replaces the snapshot with `sessions`. Either the old or the new snapshot is visible
    /// to readers, never a partial write.
    fn save_all(&self, sessions: &[&Session]) -> Result<(), StorageError>;
}
