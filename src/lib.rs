pub mod authentication;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod firewall;
pub mod network;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use controller::Controller;
