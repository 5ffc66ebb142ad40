//! EC25519-FHMQV-C shared-key derivation
//!
//! Each session establishment exchanges fresh ephemeral keys; the shared key
//! mixes both long-term and both ephemeral keys, so either side can prove
//! possession of its long-term secret without signatures. The derivation is
//! asymmetric: initiator and responder assign the hash inputs in opposite
//! order and arrive at the same key.

use crate::crypto::ec25519::{KEY_SIZE, Point, gf_add, gf_mult};
use crate::crypto::keys::KeyPair;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// Value of the ProtocolName record for this key exchange
pub const PROTOCOL_NAME: &str = "ec25519-fhmqvc";

/// Transient state of one session establishment
pub struct Handshake {
    peer_handshake_key: [u8; KEY_SIZE],
    our_handshake_key: KeyPair,
    shared_key: Option<[u8; KEY_SIZE]>,
    deadline: Instant,
}

impl Handshake {
    /// Starts a handshake with a fresh random ephemeral keypair. The finish
    /// message is only acceptable until `lifetime` has elapsed.
    pub fn new(peer_handshake_key: [u8; KEY_SIZE], lifetime: Duration) -> Handshake {
        Handshake::with_keys(peer_handshake_key, KeyPair::random(), lifetime)
    }

    /// Starts a handshake with a caller-provided ephemeral keypair.
    pub fn with_keys(
        peer_handshake_key: [u8; KEY_SIZE],
        our_handshake_key: KeyPair,
        lifetime: Duration,
    ) -> Handshake {
        Handshake {
            peer_handshake_key,
            our_handshake_key,
            shared_key: None,
            deadline: Instant::now() + lifetime,
        }
    }

    /// Our ephemeral public key.
    pub fn our_public(&self) -> &[u8; KEY_SIZE] {
        self.our_handshake_key.public()
    }

    pub fn shared_key(&self) -> Option<&[u8; KEY_SIZE]> {
        self.shared_key.as_ref()
    }

    pub fn expired(&self) -> bool {
        self.deadline <= Instant::now()
    }

    /// Derives the FHMQV-C shared key and stores it on the handshake.
    ///
    /// `our_key` is our long-term keypair, `peer_key` the peer's long-term
    /// packed public key. Returns false when either peer key fails to load,
    /// is the identity, or the combined point degenerates to the identity.
    pub fn make_shared_key(
        &mut self,
        initiator: bool,
        our_key: &KeyPair,
        peer_key: &[u8; KEY_SIZE],
    ) -> bool {
        let peer_point = match Point::unpack_legacy(peer_key) {
            Some(p) if !p.is_identity() => p,
            _ => return false,
        };
        let peer_handshake_point = match Point::unpack_legacy(&self.peer_handshake_key) {
            Some(p) if !p.is_identity() => p,
            _ => return false,
        };

        let (a, b, x, y) = if initiator {
            (
                our_key.public(),
                peer_key,
                self.our_handshake_key.public(),
                &self.peer_handshake_key,
            )
        } else {
            (
                peer_key,
                our_key.public(),
                &self.peer_handshake_key,
                self.our_handshake_key.public(),
            )
        };

        let mut hash = Sha256::new();
        hash.update(y);
        hash.update(x);
        hash.update(b);
        hash.update(a);
        let digest = hash.finalize();

        let mut d = [0u8; KEY_SIZE];
        let mut e = [0u8; KEY_SIZE];
        d[..16].copy_from_slice(&digest[..16]);
        e[..16].copy_from_slice(&digest[16..]);
        d[15] |= 0x80;
        e[15] |= 0x80;

        let (s, work) = if initiator {
            (
                gf_add(&gf_mult(&d, our_key.secret()), self.our_handshake_key.secret()),
                peer_point.scalar_mult_bits(&e, 128),
            )
        } else {
            (
                gf_add(&gf_mult(&e, our_key.secret()), self.our_handshake_key.secret()),
                peer_point.scalar_mult_bits(&d, 128),
            )
        };

        let mut work = work.add(&peer_handshake_point);

        // Both secret keys were divided by 8; multiplying the point by 8
        // compensates and at the same time forces it into the prime-order
        // subgroup, blocking small-subgroup inputs.
        work = octuple_point(&work);
        work = work.scalar_mult(&s);

        if work.is_identity() {
            return false;
        }

        let sigma = work.pack_legacy();
        self.shared_key = Some(derive_key(a, b, x, y, &sigma));
        true
    }
}

fn octuple_point(p: &Point) -> Point {
    let mut r = p.add(p);
    r = r.add(&r);
    r.add(&r)
}

/// HKDF-SHA256 with an empty salt: extract from sigma, then one expansion
/// block over the four public keys.
fn derive_key(
    a: &[u8; KEY_SIZE],
    b: &[u8; KEY_SIZE],
    x: &[u8; KEY_SIZE],
    y: &[u8; KEY_SIZE],
    sigma: &[u8; KEY_SIZE],
) -> [u8; KEY_SIZE] {
    let mut extractor =
        <Hmac<Sha256> as Mac>::new_from_slice(&[]).expect("HMAC accepts any key length");
    extractor.update(sigma);
    let prk = extractor.finalize().into_bytes();

    let mut expander =
        <Hmac<Sha256> as Mac>::new_from_slice(&prk).expect("HMAC accepts any key length");
    expander.update(a);
    expander.update(b);
    expander.update(x);
    expander.update(y);
    expander.update(&[0x01]);
    expander.finalize().into_bytes().into()
}
