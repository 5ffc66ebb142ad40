//! Wire format for fastd handshake packets
//!
//! The codec is split into the address representation ([`sockaddr::Sockaddr`]),
//! the TLV record map ([`records::Records`]) and the framed handshake message
//! with its optional HMAC trailer ([`message::Message`]).

pub mod errors;
pub mod message;
pub mod records;
pub mod sockaddr;

pub use errors::MessageError;
pub use message::Message;
pub use records::{HandshakeType, Mode, Records, ReplyCode, TlvKey};
pub use sockaddr::Sockaddr;
