//! Captive-portal HTTP surface.
//!
//! Components:
//! - `request`: byte-level request parsing (request line, `Content-Length`, form bodies).
//! - `response`: hand-built responses with the fixed header set.
//! - `routes`: the path allow-list and method rules.
//! - `templates`: page bodies, embedded at build time with optional on-disk overrides.
//! - `web_server`: the per-connection handler tying parsing, login and sessions together.

pub mod request;
pub mod response;
pub mod routes;
pub mod templates;
pub mod web_server;


pub use response::{Response, StatusCode};
pub use templates::{Page, TemplateSet};
pub use web_server::WebServer;
