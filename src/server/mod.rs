pub mod config;
pub mod handler;
pub mod peer;
pub mod server;
mod sweeper;

pub use config::Config;
pub use handler::{Handler, MIN_MTU};
pub use peer::{Peer, PeerTable, PtpAddrs};
pub use server::Server;
