//! TLV records carried by handshake packets
//!
//! Every handshake parameter is a TLV record: 2 bytes key (little-endian),
//! 2 bytes length (little-endian), then the value bytes. [`Records`] keeps one
//! slot per recognised key; unknown keys seen on the wire are skipped.

use std::fmt;
use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Number of recognised TLV keys
pub const RECORD_COUNT: usize = 24;

/// TLV keys understood by this implementation
///
/// Keys 16 and up are not part of the official protocol description and are
/// only exchanged between implementations that know about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TlvKey {
    HandshakeType = 0,
    ReplyCode = 1,
    ErrorDetail = 2,
    Flags = 3,
    Mode = 4,
    ProtocolName = 5,
    SenderKey = 6,
    RecipientKey = 7,
    SenderHandshakeKey = 8,
    RecipientHandshakeKey = 9,
    AuthenticationTag = 10,
    Mtu = 11,
    MethodName = 12,
    VersionName = 13,
    MethodList = 14,
    TlvMac = 15,
    Ipv4Addr = 16,
    Ipv4DstAddr = 17,
    Ipv4PrefixLen = 18,
    Ipv6Addr = 19,
    Ipv6DstAddr = 20,
    Ipv6PrefixLen = 21,
    Vars = 22,
    Hostname = 23,
}

impl TryFrom<u16> for TlvKey {
    type Error = u16;

    fn try_from(v: u16) -> Result<Self, u16> {
        use TlvKey::*;
        Ok(match v {
            0 => HandshakeType,
            1 => ReplyCode,
            2 => ErrorDetail,
            3 => Flags,
            4 => Mode,
            5 => ProtocolName,
            6 => SenderKey,
            7 => RecipientKey,
            8 => SenderHandshakeKey,
            9 => RecipientHandshakeKey,
            10 => AuthenticationTag,
            11 => Mtu,
            12 => MethodName,
            13 => VersionName,
            14 => MethodList,
            15 => TlvMac,
            16 => Ipv4Addr,
            17 => Ipv4DstAddr,
            18 => Ipv4PrefixLen,
            19 => Ipv6Addr,
            20 => Ipv6DstAddr,
            21 => Ipv6PrefixLen,
            22 => Vars,
            23 => Hostname,
            other => return Err(other),
        })
    }
}

impl Display for TlvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TlvKey::HandshakeType => "handshake_type",
            TlvKey::ReplyCode => "reply_code",
            TlvKey::ErrorDetail => "error_detail",
            TlvKey::Flags => "flags",
            TlvKey::Mode => "mode",
            TlvKey::ProtocolName => "protocol_name",
            TlvKey::SenderKey => "sender_key",
            TlvKey::RecipientKey => "recipient_key",
            TlvKey::SenderHandshakeKey => "sender_handshake_key",
            TlvKey::RecipientHandshakeKey => "recipient_handshake_key",
            TlvKey::AuthenticationTag => "authentication_tag",
            TlvKey::Mtu => "mtu",
            TlvKey::MethodName => "method_name",
            TlvKey::VersionName => "version_name",
            TlvKey::MethodList => "method_list",
            TlvKey::TlvMac => "tlv_mac",
            TlvKey::Ipv4Addr => "ipv4_addr",
            TlvKey::Ipv4DstAddr => "ipv4_dstaddr",
            TlvKey::Ipv4PrefixLen => "ipv4_prefixlen",
            TlvKey::Ipv6Addr => "ipv6_addr",
            TlvKey::Ipv6DstAddr => "ipv6_dstaddr",
            TlvKey::Ipv6PrefixLen => "ipv6_prefixlen",
            TlvKey::Vars => "vars",
            TlvKey::Hostname => "hostname",
        };
        f.write_str(name)
    }
}

/// Value of the HandshakeType record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    Request = 1,
    Reply = 2,
    Finish = 3,
}

impl TryFrom<u8> for HandshakeType {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(HandshakeType::Request),
            2 => Ok(HandshakeType::Reply),
            3 => Ok(HandshakeType::Finish),
            other => Err(other),
        }
    }
}

/// Value of the ReplyCode record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Success = 0,
    RecordMissing = 1,
    UnacceptableValue = 2,
}

impl TryFrom<u8> for ReplyCode {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(ReplyCode::Success),
            1 => Ok(ReplyCode::RecordMissing),
            2 => Ok(ReplyCode::UnacceptableValue),
            other => Err(other),
        }
    }
}

/// Value of the Mode record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Tap = 0,
    Tun = 1,
}

/// One slot per recognised TLV key, empty or an owned value
#[derive(Debug, Clone, Default)]
pub struct Records([Option<Vec<u8>>; RECORD_COUNT]);

impl Records {
    pub fn get(&self, key: TlvKey) -> Option<&[u8]> {
        self.0[key as usize].as_deref()
    }

    pub fn set(&mut self, key: TlvKey, value: Vec<u8>) -> &mut Self {
        self.0[key as usize] = Some(value);
        self
    }

    pub(crate) fn set_raw(&mut self, key: usize, value: Vec<u8>) {
        self.0[key] = Some(value);
    }

    /// Iterates over the occupied slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (TlvKey, &[u8])> {
        self.0.iter().enumerate().filter_map(|(i, v)| {
            let key = TlvKey::try_from(i as u16).ok()?;
            Some((key, v.as_deref()?))
        })
    }

    pub fn handshake_type(&self) -> Option<HandshakeType> {
        match self.get(TlvKey::HandshakeType)? {
            [t] => HandshakeType::try_from(*t).ok(),
            _ => None,
        }
    }

    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self.get(TlvKey::ReplyCode)? {
            [c] => ReplyCode::try_from(*c).ok(),
            _ => None,
        }
    }

    pub fn sender_key(&self) -> Option<&[u8]> {
        self.get(TlvKey::SenderKey)
    }

    pub fn recipient_key(&self) -> Option<&[u8]> {
        self.get(TlvKey::RecipientKey)
    }

    pub fn sender_handshake_key(&self) -> Option<&[u8]> {
        self.get(TlvKey::SenderHandshakeKey)
    }

    pub fn recipient_handshake_key(&self) -> Option<&[u8]> {
        self.get(TlvKey::RecipientHandshakeKey)
    }

    pub fn protocol_name(&self) -> Option<&str> {
        std::str::from_utf8(self.get(TlvKey::ProtocolName)?).ok()
    }

    pub fn method_name(&self) -> Option<&str> {
        std::str::from_utf8(self.get(TlvKey::MethodName)?).ok()
    }

    pub fn version_name(&self) -> Option<&str> {
        std::str::from_utf8(self.get(TlvKey::VersionName)?).ok()
    }

    /// The MTU record, if present with its 2-byte little-endian shape.
    pub fn mtu(&self) -> Option<u16> {
        match self.get(TlvKey::Mtu)? {
            [lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    pub fn set_handshake_type(&mut self, t: HandshakeType) -> &mut Self {
        self.set(TlvKey::HandshakeType, vec![t as u8])
    }

    pub fn set_reply_code(&mut self, code: ReplyCode) -> &mut Self {
        self.set(TlvKey::ReplyCode, vec![code as u8])
    }

    pub fn set_mode(&mut self, mode: Mode) -> &mut Self {
        self.set(TlvKey::Mode, vec![mode as u8])
    }

    pub fn set_protocol_name(&mut self, name: &str) -> &mut Self {
        self.set(TlvKey::ProtocolName, name.as_bytes().to_vec())
    }

    pub fn set_method_name(&mut self, name: &str) -> &mut Self {
        self.set(TlvKey::MethodName, name.as_bytes().to_vec())
    }

    pub fn set_method_list(&mut self, methods: &[&str]) -> &mut Self {
        self.set(TlvKey::MethodList, methods.join("\0").into_bytes())
    }

    pub fn set_version_name(&mut self, name: &str) -> &mut Self {
        self.set(TlvKey::VersionName, name.as_bytes().to_vec())
    }

    pub fn set_sender_key(&mut self, key: &[u8]) -> &mut Self {
        self.set(TlvKey::SenderKey, key.to_vec())
    }

    pub fn set_recipient_key(&mut self, key: &[u8]) -> &mut Self {
        self.set(TlvKey::RecipientKey, key.to_vec())
    }

    pub fn set_sender_handshake_key(&mut self, key: &[u8]) -> &mut Self {
        self.set(TlvKey::SenderHandshakeKey, key.to_vec())
    }

    pub fn set_recipient_handshake_key(&mut self, key: &[u8]) -> &mut Self {
        self.set(TlvKey::RecipientHandshakeKey, key.to_vec())
    }

    pub fn set_mtu(&mut self, mtu: u16) -> &mut Self {
        self.set(TlvKey::Mtu, mtu.to_le_bytes().to_vec())
    }

    pub fn set_hostname(&mut self, hostname: &str) -> &mut Self {
        self.set(TlvKey::Hostname, hostname.as_bytes().to_vec())
    }
}

impl Display for Records {
    /// Renders known record values by their schema, for handshake logging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Records[ ")?;
        for (key, val) in self.iter() {
            write!(f, "{}=", key)?;
            match key {
                TlvKey::ProtocolName
                | TlvKey::MethodName
                | TlvKey::VersionName
                | TlvKey::Hostname
                | TlvKey::Vars => write!(f, "{}", String::from_utf8_lossy(val))?,
                TlvKey::Mtu => match val {
                    [lo, hi] => write!(f, "{}", u16::from_le_bytes([*lo, *hi]))?,
                    _ => write!(f, "{:x?}", val)?,
                },
                TlvKey::Ipv4PrefixLen | TlvKey::Ipv6PrefixLen => match val {
                    [n] => write!(f, "{}", n)?,
                    _ => write!(f, "{:x?}", val)?,
                },
                TlvKey::Ipv4Addr | TlvKey::Ipv4DstAddr => match <[u8; 4]>::try_from(val) {
                    Ok(o) => write!(f, "{}", Ipv4Addr::from(o))?,
                    Err(_) => write!(f, "{:x?}", val)?,
                },
                TlvKey::Ipv6Addr | TlvKey::Ipv6DstAddr => match <[u8; 16]>::try_from(val) {
                    Ok(o) => write!(f, "{}", Ipv6Addr::from(o))?,
                    Err(_) => write!(f, "{:x?}", val)?,
                },
                TlvKey::MethodList => {
                    let methods: Vec<_> = val.split(|b| *b == 0).collect();
                    for (i, m) in methods.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", String::from_utf8_lossy(m))?;
                    }
                }
                _ => {
                    for b in val {
                        write!(f, "{:02x}", b)?;
                    }
                }
            }
            write!(f, " ")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let mut records = Records::default();
        records
            .set_handshake_type(HandshakeType::Request)
            .set_protocol_name("ec25519-fhmqvc")
            .set_mtu(1406);

        assert_eq!(records.handshake_type(), Some(HandshakeType::Request));
        assert_eq!(records.protocol_name(), Some("ec25519-fhmqvc"));
        assert_eq!(records.mtu(), Some(1406));
        assert_eq!(records.get(TlvKey::Mtu), Some(&[0x7e, 0x05][..]));
        assert!(records.sender_key().is_none());
    }

    #[test]
    fn mtu_requires_two_bytes() {
        let mut records = Records::default();
        records.set(TlvKey::Mtu, vec![0x05]);
        assert_eq!(records.mtu(), None);
    }

    #[test]
    fn unknown_key_values_rejected() {
        assert!(TlvKey::try_from(24u16).is_err());
        assert!(HandshakeType::try_from(4u8).is_err());
        assert!(ReplyCode::try_from(3u8).is_err());
    }
}
