//! Thin client counterpart: initiator handshake plus TUN device setup

pub mod config;
pub mod device;
pub mod session;

pub use config::ClientConfig;
pub use session::{Established, connect};
