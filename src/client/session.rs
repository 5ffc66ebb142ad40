//! Initiator side of the handshake
//!
//! The client sends a request, validates and authenticates the reply, then
//! confirms with a signed finish message. After that the session is live;
//! payload flows through the negotiated tunnel interface, not through this
//! code.

use crate::client::config::ClientConfig;
use crate::codec::message::MESSAGE_TYPE_HANDSHAKE;
use crate::codec::{HandshakeType, Message, Mode, Records, ReplyCode};
use crate::crypto::fhmqvc::PROTOCOL_NAME;
use crate::crypto::{Handshake, KEY_SIZE, KeyPair};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// The outcome of a completed handshake
pub struct Established {
    /// Records of the server's reply; carries the negotiated addresses
    pub records: Records,
    pub remote: SocketAddr,
    pub mtu: u16,
}

/// Performs the full initiator handshake against `config.remote_addr`.
pub async fn connect(config: &ClientConfig) -> crate::Result<Established> {
    let keys = KeyPair::from_hex(&config.secret)?;
    let peer_key: [u8; KEY_SIZE] = hex::decode(&config.remote_key)
        .ok()
        .and_then(|k| k.try_into().ok())
        .ok_or("invalid remote key")?;
    let handshake_keys = KeyPair::random();
    let timeout = Duration::from_secs(config.connect_timeout);

    let remote = tokio::net::lookup_host(&config.remote_addr)
        .await?
        .next()
        .ok_or_else(|| format!("unable to resolve {:?}", config.remote_addr))?;
    tracing::info!("resolved {:?} to {}", config.remote_addr, remote);

    let bind_addr = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(remote).await?;

    let mut request = Message::new(MESSAGE_TYPE_HANDSHAKE);
    request
        .records
        .set_handshake_type(HandshakeType::Request)
        .set_mode(Mode::Tun)
        .set_protocol_name(PROTOCOL_NAME)
        .set_sender_key(keys.public())
        .set_version_name("v18")
        .set_recipient_key(&peer_key)
        .set_sender_handshake_key(handshake_keys.public());
    if let Some(hostname) = hostname() {
        request.records.set_hostname(&hostname);
    }

    tracing::info!("sending handshake request");
    tracing::debug!("request payload: {}", request.records);
    socket.send(&request.marshal(false)).await?;

    tracing::info!("waiting for handshake reply");
    let mut reply = wait_for_packet(&socket, timeout).await?;
    tracing::debug!("reply payload: {}", reply.records);

    if reply.records.handshake_type() != Some(HandshakeType::Reply) {
        return Err("unexpected handshake type in reply".into());
    }
    if reply.records.reply_code() != Some(ReplyCode::Success) {
        return Err(format!(
            "handshake rejected: {:?} (detail {:?})",
            reply.records.reply_code(),
            reply.records.get(crate::codec::TlvKey::ErrorDetail)
        )
        .into());
    }
    if reply.records.recipient_handshake_key() != Some(&handshake_keys.public()[..]) {
        return Err("recipient handshake key mismatch".into());
    }
    let sender_handshake_key: [u8; KEY_SIZE] = reply
        .records
        .sender_handshake_key()
        .and_then(|k| k.try_into().ok())
        .ok_or("invalid sender handshake key")?;

    let mut hs = Handshake::with_keys(sender_handshake_key, handshake_keys, timeout);
    if !hs.make_shared_key(true, &keys, &peer_key) {
        return Err("unable to make shared handshake key".into());
    }
    let shared_key = hs.shared_key().copied().ok_or("shared key missing")?;

    reply.sign_key = Some(shared_key.to_vec());
    if !reply.verify_signature() {
        return Err("invalid signature".into());
    }

    let mut finish = reply.new_reply();
    finish
        .records
        .set_sender_key(keys.public())
        .set_recipient_key(&peer_key)
        .set_sender_handshake_key(hs.our_public())
        .set_recipient_handshake_key(&sender_handshake_key)
        .set_mtu(config.mtu)
        .set_method_name("null");
    finish.sign_key = Some(shared_key.to_vec());
    socket.send(&finish.marshal(false)).await?;
    tracing::info!("handshake finished");

    Ok(Established {
        records: reply.records.clone(),
        remote,
        mtu: config.mtu,
    })
}

/// Receives until a parseable handshake message arrives or the timeout
/// elapses.
async fn wait_for_packet(socket: &UdpSocket, timeout: Duration) -> crate::Result<Message> {
    let mut buf = vec![0u8; 1500];
    let receive = async {
        loop {
            let len = socket.recv(&mut buf).await?;
            match Message::parse(&buf[..len], false) {
                Ok(msg) => return Ok::<Message, crate::Error>(msg),
                Err(e) => tracing::debug!("unable to parse message: {}", e),
            }
        }
    };
    match tokio::time::timeout(timeout, receive).await {
        Ok(result) => result,
        Err(_) => Err("reached timeout waiting for reply".into()),
    }
}

fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let res = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if res != 0 {
        return None;
    }
    let end = buf.iter().position(|b| *b == 0)?;
    String::from_utf8(buf[..end].to_vec()).ok()
}
