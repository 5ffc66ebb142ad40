//! Handshake message framing
//!
//! A handshake packet is a 4-byte header followed by TLV records:
//!
//! ```text
//! +--------+--------+--------+--------+--------....--------+
//! |  Type  |Reserved|  Payload Length |    TLV records     |
//! +--------+--------+--------+--------+--------....--------+
//! ```
//!
//! - Type: 1 = handshake, 2 = data (1 byte)
//! - Reserved: must be 0 (1 byte)
//! - Payload Length: length of the TLV region in bytes, big-endian,
//!   excluding the 4 header bytes
//!
//! The kernel datapath prepends two 18-byte sockaddrs (source, destination)
//! to every frame; the userspace UDP datapath does not. An optional trailing
//! TLVMAC record carries an HMAC-SHA256 over the payload starting at offset 4
//! with the MAC value field zeroed.

use crate::codec::errors::MessageError;
use crate::codec::records::{RECORD_COUNT, Records, ReplyCode, TlvKey};
use crate::codec::sockaddr::{SOCKADDR_SIZE, Sockaddr};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::fmt::Display;

/// Packet type of handshake messages
pub const MESSAGE_TYPE_HANDSHAKE: u8 = 1;
/// Packet type of data frames
pub const MESSAGE_TYPE_DATA: u8 = 2;

const HEADER_SIZE: usize = 4;
const SHA256_SIZE: usize = 32;

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; SHA256_SIZE] {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// A parsed handshake frame
///
/// `raw` holds the payload exactly as seen on the wire, with the TLVMAC value
/// bytes zeroed in place, so that signature verification can re-hash the same
/// bytes the sender hashed.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub src: Sockaddr,
    pub dst: Sockaddr,
    pub packet_type: u8,
    pub records: Records,
    pub sign_key: Option<Vec<u8>>,
    raw: Vec<u8>,
}

impl Message {
    pub fn new(packet_type: u8) -> Self {
        Message {
            packet_type,
            ..Default::default()
        }
    }

    /// Creates a reply: addresses swapped, handshake type bumped, Mode and
    /// ProtocolName echoed.
    pub fn new_reply(&self) -> Message {
        let mut reply = Message::new(MESSAGE_TYPE_HANDSHAKE);
        reply.src = self.dst;
        reply.dst = self.src;
        if let Some(&[t]) = self.records.get(TlvKey::HandshakeType) {
            reply.records.set(TlvKey::HandshakeType, vec![t.wrapping_add(1)]);
        }
        if let Some(mode) = self.records.get(TlvKey::Mode) {
            reply.records.set(TlvKey::Mode, mode.to_vec());
        }
        if let Some(proto) = self.records.get(TlvKey::ProtocolName) {
            reply.records.set(TlvKey::ProtocolName, proto.to_vec());
        }
        reply
    }

    /// Sets the error reply fields.
    pub fn set_error(&mut self, code: ReplyCode, detail: TlvKey) {
        self.records.set_reply_code(code);
        self.records
            .set(TlvKey::ErrorDetail, (detail as u16).to_le_bytes().to_vec());
    }

    /// Parses a message, optionally preceded by the two sockaddrs the kernel
    /// datapath prepends.
    pub fn parse(buf: &[u8], include_sockaddr: bool) -> Result<Message, MessageError> {
        let mut msg = Message::default();
        let offset = if include_sockaddr {
            if buf.len() < 2 * SOCKADDR_SIZE + HEADER_SIZE {
                return Err(MessageError::TooShort(buf.len()));
            }
            msg.src = Sockaddr::parse(&buf[0..18]).expect("length checked");
            msg.dst = Sockaddr::parse(&buf[18..36]).expect("length checked");
            2 * SOCKADDR_SIZE
        } else {
            if buf.len() < HEADER_SIZE {
                return Err(MessageError::TooShort(buf.len()));
            }
            0
        };

        msg.packet_type = buf[offset];
        msg.raw = buf[offset..].to_vec();
        msg.unmarshal_payload()?;
        Ok(msg)
    }

    /// Decodes the TLV region of `raw`, zeroing the TLVMAC value in place.
    fn unmarshal_payload(&mut self) -> Result<(), MessageError> {
        let declared = u16::from_be_bytes([self.raw[2], self.raw[3]]) as usize;
        let payload = self.raw.len() - HEADER_SIZE;
        if payload != declared {
            return Err(MessageError::WrongDataSize {
                expected: declared,
                actual: payload,
            });
        }

        let mut i = HEADER_SIZE;
        while self.raw.len() - i >= 4 {
            let key = u16::from_le_bytes([self.raw[i], self.raw[i + 1]]);
            let length = u16::from_le_bytes([self.raw[i + 2], self.raw[i + 3]]) as usize;
            i += 4;

            if self.raw.len() - i < length {
                return Err(MessageError::WrongValueSize {
                    key,
                    expected: length,
                    actual: self.raw.len() - i,
                });
            }

            // Unsupported keys are skipped, not an error
            if key as usize >= RECORD_COUNT {
                i += length;
                continue;
            }

            let value = self.raw[i..i + length].to_vec();
            if key == TlvKey::TlvMac as u16 {
                // Zero the source bytes so the HMAC can be recomputed over
                // the packet with a blank MAC field
                self.raw[i..i + length].fill(0);
            }
            self.records.set_raw(key as usize, value);
            i += length;
        }

        Ok(())
    }

    /// Serialises the message, computing the HMAC trailer when `sign_key` is
    /// set.
    pub fn marshal(&self, include_sockaddr: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(1500);
        if include_sockaddr {
            let mut addr = [0u8; SOCKADDR_SIZE];
            self.src.write(&mut addr);
            out.extend_from_slice(&addr);
            self.dst.write(&mut addr);
            out.extend_from_slice(&addr);
        }

        let start = out.len();
        out.extend_from_slice(&[self.packet_type, 0, 0, 0]);

        for (key, val) in self.records.iter() {
            // A fresh MAC record is appended below instead
            if key == TlvKey::TlvMac && self.sign_key.is_some() {
                continue;
            }
            push_record(&mut out, key as u16, val);
        }

        if let Some(key) = &self.sign_key {
            push_record(&mut out, TlvKey::TlvMac as u16, &[0u8; SHA256_SIZE]);
            let digest = hmac_sha256(key, &out[start + HEADER_SIZE..]);
            let mac_offset = out.len() - SHA256_SIZE;
            out[mac_offset..].copy_from_slice(&digest);
        }

        let payload_len = (out.len() - start - HEADER_SIZE) as u16;
        out[start + 2..start + 4].copy_from_slice(&payload_len.to_be_bytes());
        out
    }

    /// Recomputes the HMAC over the raw payload and compares it against the
    /// TLVMAC record. Returns false when no signing key is set.
    pub fn verify_signature(&self) -> bool {
        let Some(key) = &self.sign_key else {
            return false;
        };
        let Some(mac) = self.records.get(TlvKey::TlvMac) else {
            return false;
        };
        if self.raw.len() < HEADER_SIZE {
            return false;
        }
        hmac_sha256(key, &self.raw[HEADER_SIZE..])[..] == *mac
    }
}

fn push_record(out: &mut Vec<u8>, key: u16, val: &[u8]) {
    out.extend_from_slice(&key.to_le_bytes());
    out.extend_from_slice(&(val.len() as u16).to_le_bytes());
    out.extend_from_slice(val);
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} type={} {}",
            self.src, self.dst, self.packet_type, self.records
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::records::HandshakeType;
    use hex_literal::hex;

    fn request() -> Message {
        let mut msg = Message::new(MESSAGE_TYPE_HANDSHAKE);
        msg.src = Sockaddr::new("127.0.0.1".parse().unwrap(), 8755);
        msg.dst = Sockaddr::new("127.0.0.1".parse().unwrap(), 10000);
        msg.records
            .set_handshake_type(HandshakeType::Request)
            .set_protocol_name("ec25519-fhmqvc")
            .set_sender_key(&[0x11; 32])
            .set_recipient_key(&[0x22; 32])
            .set_sender_handshake_key(&[0x33; 32])
            .set_mtu(1406);
        msg
    }

    #[test]
    fn marshal_parse_round_trip() {
        let msg = request();
        let bytes = msg.marshal(false);
        let parsed = Message::parse(&bytes, false).unwrap();

        assert_eq!(parsed.packet_type, MESSAGE_TYPE_HANDSHAKE);
        assert_eq!(parsed.records.handshake_type(), Some(HandshakeType::Request));
        assert_eq!(parsed.records.protocol_name(), Some("ec25519-fhmqvc"));
        assert_eq!(parsed.records.sender_key(), Some(&[0x11u8; 32][..]));
        assert_eq!(parsed.records.recipient_key(), Some(&[0x22u8; 32][..]));
        assert_eq!(parsed.records.mtu(), Some(1406));
        assert_eq!(bytes.len(), parsed.marshal(false).len());
    }

    #[test]
    fn round_trip_with_sockaddrs() {
        let msg = request();
        let bytes = msg.marshal(true);
        let parsed = Message::parse(&bytes, true).unwrap();
        assert_eq!(parsed.src, msg.src);
        assert_eq!(parsed.dst, msg.dst);
        assert_eq!(parsed.src.port(), 8755);
    }

    #[test]
    fn rejects_wrong_data_size() {
        let mut bytes = request().marshal(false);
        bytes[3] = bytes[3].wrapping_add(1);
        assert!(matches!(
            Message::parse(&bytes, false),
            Err(MessageError::WrongDataSize { .. })
        ));
    }

    #[test]
    fn rejects_truncated_record() {
        // one record announcing more bytes than present
        let bytes = [1u8, 0, 0, 8, 6, 0, 32, 0, 0xaa, 0xbb, 0xcc, 0xdd];
        assert!(matches!(
            Message::parse(&bytes, false),
            Err(MessageError::WrongValueSize { key: 6, .. })
        ));
    }

    #[test]
    fn skips_unknown_keys() {
        // key 99 (unknown, 2 bytes), then handshake type
        let bytes = [1u8, 0, 0, 11, 99, 0, 2, 0, 0xfe, 0xfe, 0, 0, 1, 0, 1];
        let parsed = Message::parse(&bytes, false).unwrap();
        assert_eq!(parsed.records.handshake_type(), Some(HandshakeType::Request));
    }

    #[test]
    fn too_short() {
        assert!(matches!(
            Message::parse(&[1, 0], false),
            Err(MessageError::TooShort(2))
        ));
        assert!(matches!(
            Message::parse(&[0u8; 39], true),
            Err(MessageError::TooShort(39))
        ));
    }

    #[test]
    fn signature_round_trip() {
        let shared = hex!("08d845c98084f16cb9d21f6a2d5c270de008ed6faa0f81fa0071360296e227f2");

        let mut msg = request();
        msg.records.set_method_name("null");
        msg.sign_key = Some(shared.to_vec());
        let bytes = msg.marshal(false);

        // correct key verifies
        let mut parsed = Message::parse(&bytes, false).unwrap();
        assert!(!parsed.verify_signature());
        parsed.sign_key = Some(shared.to_vec());
        assert!(parsed.verify_signature());

        // any other key must fail
        parsed.sign_key =
            Some(hex!("bd3bd258df61fa369d1bf003a8a3ccb2f08a8931bf8add78eddaefbc1defc5b5").to_vec());
        assert!(!parsed.verify_signature());

        // absent key returns false rather than panicking
        parsed.sign_key = None;
        assert!(!parsed.verify_signature());
    }
}
