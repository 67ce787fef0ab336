//! Startup, shutdown and operator commands.
//!
//! The controller validates the configuration, restores the session table, and runs the
//! listener together with the periodic expiry sweep until shutdown.

pub mod controller_handler;

pub use controller_handler::{load_credentials, Controller};
