//! The handshake protocol state machine
//!
//! [`Handler::handle_packet`] consumes one parsed message and produces at
//! most one reply. Failures the remote peer is entitled to diagnose come
//! back as replies with a ReplyCode and ErrorDetail record; everything else
//! is dropped without a reply, indistinguishable from a silent server.

use crate::codec::message::MESSAGE_TYPE_HANDSHAKE;
use crate::codec::sockaddr::SOCKADDR_SIZE;
use crate::codec::{HandshakeType, Message, ReplyCode, TlvKey};
use crate::crypto::{Handshake, KEY_SIZE};
use crate::iface::{IFACE_PREFIX, Ifconfig};
use crate::server::config::Config;
use crate::server::peer::{PeerMap, PeerTable};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a responder waits for the finish message
const HANDSHAKE_LIFETIME: Duration = Duration::from_secs(3);

/// Smallest MTU a peer may negotiate
pub const MIN_MTU: u16 = 576;

pub struct Handler {
    config: Arc<Config>,
    peers: Arc<PeerTable>,
    ifconfig: Arc<dyn Ifconfig>,
}

impl Handler {
    pub fn new(config: Arc<Config>, peers: Arc<PeerTable>, ifconfig: Arc<dyn Ifconfig>) -> Handler {
        Handler {
            config,
            peers,
            ifconfig,
        }
    }

    /// Runs the validation sequence and the per-type dispatch. Returns the
    /// reply to transmit, if any.
    pub fn handle_packet(&self, msg: &mut Message) -> Option<Message> {
        if msg.packet_type != MESSAGE_TYPE_HANDSHAKE {
            tracing::debug!("ignoring non-handshake packet type {}", msg.packet_type);
            return None;
        }

        let handshake_type = match msg.records.get(TlvKey::HandshakeType) {
            Some(&[t]) => t,
            _ => {
                tracing::debug!("handshake type missing");
                return None;
            }
        };

        tracing::info!(
            "received handshake from {} using fastd {}",
            msg.src,
            msg.records.version_name().unwrap_or("(unknown)")
        );

        let mut reply = msg.new_reply();

        // Missing records are the peer's business to know about
        let Some(sender_key) = msg.records.sender_key() else {
            tracing::debug!("sender key missing");
            reply.set_error(ReplyCode::RecordMissing, TlvKey::SenderKey);
            return Some(reply);
        };
        let Some(recipient_key) = msg.records.recipient_key() else {
            tracing::debug!("recipient key missing");
            reply.set_error(ReplyCode::RecordMissing, TlvKey::RecipientKey);
            return Some(reply);
        };
        let Some(sender_handshake_key) = msg.records.sender_handshake_key() else {
            tracing::debug!("sender handshake key missing");
            reply.set_error(ReplyCode::RecordMissing, TlvKey::SenderHandshakeKey);
            return Some(reply);
        };

        // A packet claiming to come from ourselves is a reflection
        if msg.src == msg.dst {
            tracing::debug!("source address equals destination address");
            return None;
        }

        if recipient_key != self.config.server_keys.public() {
            tracing::debug!("recipient key invalid");
            reply.set_error(ReplyCode::UnacceptableValue, TlvKey::RecipientKey);
            return Some(reply);
        }

        let (Ok(sender_key), Ok(sender_handshake_key)) = (
            <[u8; KEY_SIZE]>::try_from(sender_key),
            <[u8; KEY_SIZE]>::try_from(sender_handshake_key),
        ) else {
            tracing::debug!("malformed key record");
            return None;
        };

        let raw = msg.src.raw();
        let mut peers = self.peers.write();
        let (peer, created) = PeerTable::get_or_create(&mut peers, msg.src);

        match &peer.public_key {
            Some(existing) if *existing != sender_key => {
                tracing::debug!("sender key does not match peer {}", msg.src);
                return None;
            }
            _ => peer.public_key = Some(sender_key),
        }
        peer.last_seen = Instant::now();

        match HandshakeType::try_from(handshake_type) {
            Ok(HandshakeType::Request) => self.handle_request(
                msg,
                reply,
                &mut peers,
                raw,
                created,
                &sender_key,
                &sender_handshake_key,
            ),
            Ok(HandshakeType::Finish) => self.handle_finish(msg, reply, &mut peers, raw),
            _ => {
                tracing::warn!("unsupported handshake type: {}", handshake_type);
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_request(
        &self,
        msg: &Message,
        mut reply: Message,
        peers: &mut PeerMap,
        raw: [u8; SOCKADDR_SIZE],
        created: bool,
        sender_key: &[u8; KEY_SIZE],
        sender_handshake_key: &[u8; KEY_SIZE],
    ) -> Option<Message> {
        let peer = peers.get_mut(&raw)?;

        let mut hs = Handshake::new(*sender_handshake_key, HANDSHAKE_LIFETIME);
        if !hs.make_shared_key(false, &self.config.server_keys, sender_key) {
            tracing::debug!("unable to make shared handshake key");
            return None;
        }
        let shared_key = hs.shared_key().copied()?;
        peer.handshake = Some(hs);

        if let Some(verify) = &self.config.verify_peer {
            if !verify(peer) {
                tracing::debug!("peer {} failed verification", msg.src);
                self.discard(peers, &raw, created);
                return None;
            }
        }

        let peer = peers.get_mut(&raw)?;
        if peer.ifname.is_none() {
            match self.ifconfig.create(IFACE_PREFIX, &peer.remote, sender_key) {
                Ok(ifname) => {
                    tracing::info!("created interface {} for {}", ifname, peer.remote);
                    peer.ifname = Some(ifname);
                }
                Err(e) => {
                    tracing::error!("interface creation failed: {}", e);
                    self.discard(peers, &raw, created);
                    return None;
                }
            }
        }

        if let Some(assign) = &self.config.assign_addresses {
            assign(peer);
        }

        reply.records.set_reply_code(ReplyCode::Success);
        reply.records.set_method_list(&["null"]);
        reply.records.set_version_name(reply_version(msg));
        if let Some(mtu) = msg.records.get(TlvKey::Mtu) {
            reply.records.set(TlvKey::Mtu, mtu.to_vec());
        }
        reply.records.set_sender_key(self.config.server_keys.public());
        if let Some(hs) = &peer.handshake {
            reply.records.set_sender_handshake_key(hs.our_public());
        }
        reply.records.set_recipient_key(sender_key);
        reply.records.set_recipient_handshake_key(sender_handshake_key);

        if !peer.vars.is_empty() {
            reply.records.set(TlvKey::Vars, peer.vars.clone());
        }
        if let Some(addr) = peer.ipv4.local {
            reply.records.set(TlvKey::Ipv4Addr, addr.octets().to_vec());
        }
        if let Some(addr) = peer.ipv4.dest {
            reply.records.set(TlvKey::Ipv4DstAddr, addr.octets().to_vec());
        }
        if let Some(addr) = peer.ipv6.local {
            reply.records.set(TlvKey::Ipv6Addr, addr.octets().to_vec());
        }
        if let Some(addr) = peer.ipv6.dest {
            reply.records.set(TlvKey::Ipv6DstAddr, addr.octets().to_vec());
        }

        // The codec HMACs the reply with the session key
        reply.sign_key = Some(shared_key.to_vec());
        Some(reply)
    }

    fn handle_finish(
        &self,
        msg: &mut Message,
        mut reply: Message,
        peers: &mut PeerMap,
        raw: [u8; SOCKADDR_SIZE],
    ) -> Option<Message> {
        let peer = peers.get_mut(&raw)?;

        match msg.records.get(TlvKey::MethodName) {
            None => {
                tracing::debug!("method name missing");
                reply.set_error(ReplyCode::RecordMissing, TlvKey::MethodName);
                return Some(reply);
            }
            Some(method) if method != b"null" => {
                tracing::debug!("method name invalid");
                reply.set_error(ReplyCode::UnacceptableValue, TlvKey::MethodName);
                return Some(reply);
            }
            Some(_) => {}
        }

        let Some(hs) = peer.handshake.as_ref() else {
            tracing::debug!("finish from {} without pending handshake", msg.src);
            return None;
        };

        msg.sign_key = hs.shared_key().map(|k| k.to_vec());
        if !msg.verify_signature() {
            tracing::debug!("invalid signature from {}", msg.src);
            return None;
        }

        if hs.expired() {
            tracing::debug!("handshake with {} timed out", msg.src);
            return None;
        }

        if msg.records.get(TlvKey::Mtu).is_none() {
            tracing::debug!("mtu missing");
            return None;
        }
        let Some(mtu) = msg.records.mtu() else {
            tracing::debug!("malformed mtu record");
            return None;
        };
        if mtu < MIN_MTU {
            tracing::debug!("mtu {} below minimum", mtu);
            return None;
        }

        if let Some(ifname) = &peer.ifname {
            if let Err(e) = self.ifconfig.set_mtu(ifname, mtu) {
                tracing::error!("failed to set mtu on {}: {}", ifname, e);
            }
        }
        peer.mtu = mtu;
        peer.handshake = None;

        if let Some(ifname) = peer.ifname.clone() {
            if let (Some(local), Some(dest)) = (peer.ipv4.local, peer.ipv4.dest) {
                if let Err(e) =
                    self.ifconfig
                        .set_addr_ptp(&ifname, IpAddr::V4(local), IpAddr::V4(dest))
                {
                    tracing::error!("failed to set ipv4 addresses on {}: {}", ifname, e);
                }
            }
            if let (Some(local), Some(dest)) = (peer.ipv6.local, peer.ipv6.dest) {
                if let Err(e) =
                    self.ifconfig
                        .set_addr_ptp(&ifname, IpAddr::V6(local), IpAddr::V6(dest))
                {
                    tracing::error!("failed to set ipv6 addresses on {}: {}", ifname, e);
                }
            }
        }

        if let Some(establish) = &self.config.establish_peer {
            establish(peer);
        }
        tracing::info!("established session with {}", msg.src);

        // The finish message gets no reply
        None
    }

    fn discard(&self, peers: &mut PeerMap, raw: &[u8; SOCKADDR_SIZE], created: bool) {
        if created {
            PeerTable::remove_locked(peers, raw, &*self.ifconfig);
        }
    }
}

/// Replies advertise v20 to clients that are at least that recent and v18
/// to everything else.
fn reply_version(msg: &Message) -> &'static str {
    let version = msg
        .records
        .version_name()
        .and_then(|v| v.strip_prefix('v'))
        .and_then(|v| v.parse::<u32>().ok());
    match version {
        Some(n) if n >= 20 => "v20",
        _ => "v18",
    }
}
