//! Cryptographic building blocks of the handshake
//!
//! - [`ec25519`]: curve and scalar-group arithmetic with the legacy packed
//!   point format
//! - [`keys`]: long-term and ephemeral keypairs with the divided-secret
//!   optimisation
//! - [`fhmqvc`]: per-session handshake state and the FHMQV-C shared-key
//!   derivation

pub mod ec25519;
pub mod fhmqvc;
pub mod keys;

pub use ec25519::KEY_SIZE;
pub use fhmqvc::Handshake;
pub use keys::{KeyError, KeyPair};
