//! Long-term and ephemeral keypairs
//!
//! The stored secret is the clamped secret divided by 8. The public key is
//! derived from the undivided secret; shared-key derivation compensates for
//! the division with the octuple step.

use crate::crypto::ec25519::{KEY_SIZE, Point, sanitize_secret};
use rand::RngCore;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum KeyError {
    /// Secrets and public keys are exactly 32 bytes
    InvalidLength(usize),
    /// The secret is not divisible by 8 (not a clamped Curve25519 secret)
    InvalidSecret,
    /// Not a valid hex string
    InvalidHex,
}

impl std::error::Error for KeyError {}

impl Display for KeyError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyError::InvalidLength(n) => write!(fmt, "invalid key size ({} bytes)", n),
            KeyError::InvalidSecret => write!(fmt, "invalid secret key"),
            KeyError::InvalidHex => write!(fmt, "invalid hex key"),
        }
    }
}

/// A secret key together with its derived packed public key
#[derive(Clone)]
pub struct KeyPair {
    secret: [u8; KEY_SIZE],
    public: [u8; KEY_SIZE],
}

impl KeyPair {
    /// Generates a fresh random keypair.
    pub fn random() -> KeyPair {
        let mut secret = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut secret);
        sanitize_secret(&mut secret);
        KeyPair::from_secret(&secret).expect("sanitized secrets are always divisible")
    }

    /// Builds a keypair from a raw secret. The secret must be 32 bytes and
    /// already clamped; the division by 8 is rejected if it would carry.
    pub fn from_secret(secret: &[u8]) -> Result<KeyPair, KeyError> {
        let mut secret: [u8; KEY_SIZE] = secret
            .try_into()
            .map_err(|_| KeyError::InvalidLength(secret.len()))?;

        let public = Point::scalar_mult_base(&secret).pack_legacy();

        if !divide_key(&mut secret) {
            return Err(KeyError::InvalidSecret);
        }

        Ok(KeyPair { secret, public })
    }

    pub fn from_hex(hex_secret: &str) -> Result<KeyPair, KeyError> {
        let bytes = hex::decode(hex_secret).map_err(|_| KeyError::InvalidHex)?;
        KeyPair::from_secret(&bytes)
    }

    pub fn public(&self) -> &[u8; KEY_SIZE] {
        &self.public
    }

    pub(crate) fn secret(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }
}

// No Debug derive: the secret key must not end up in log output.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", hex::encode(self.public))
    }
}

/// Shifts the secret right by three bits across the little-endian bytes.
/// Returns false if the shifted-out bits were not zero.
fn divide_key(key: &mut [u8; KEY_SIZE]) -> bool {
    let mut c = 0u8;
    for i in (0..KEY_SIZE).rev() {
        let c2 = key[i] << 5;
        key[i] = (key[i] >> 3) | c;
        c = c2;
    }
    c == 0
}
