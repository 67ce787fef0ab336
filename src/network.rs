//! Network layer: link-layer address lookup, TLS setup and the accept loop.

pub mod address_resolver;
pub mod network_listener;
pub mod tls;
pub mod types;

pub use address_resolver::{AddressResolver, NeighborTableResolver, NoopResolver};
pub use network_listener::NetworkListener;
pub use types::MacAddr;
