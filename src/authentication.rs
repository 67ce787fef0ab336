//! Credential checking.
//!
//! The portal only needs a yes/no answer for a username and secret. The answer comes from a
//! [`CredentialStore`]; [`authenticate`] wraps it so blank input never reaches a backend.

pub mod credential_store;

pub use credential_store::{authenticate, CredentialStore, FileCredentialStore};
