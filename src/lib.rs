pub mod client;
pub mod codec;
pub mod crypto;
pub mod datapath;
pub mod iface;
pub mod server;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
