//! Handshake engine tests against a mock interface capability
//!
//! Runs the full request/finish exchange the way the worker would, with the
//! client side synthesised from the captured test keys.

mod common;

use common::{CLIENT_EPHEMERAL, CLIENT_SECRET, MockIfconfig, SERVER_SECRET};
use rustd::codec::message::MESSAGE_TYPE_HANDSHAKE;
use rustd::codec::{HandshakeType, Message, Mode, ReplyCode, Sockaddr, TlvKey};
use rustd::crypto::fhmqvc::PROTOCOL_NAME;
use rustd::crypto::{Handshake, KeyPair};
use rustd::server::{Config, Handler, PeerTable};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn client_addr() -> Sockaddr {
    Sockaddr::new("127.0.0.1".parse().unwrap(), 8755)
}

fn server_addr() -> Sockaddr {
    Sockaddr::new("127.0.0.1".parse().unwrap(), 10000)
}

struct Fixture {
    handler: Handler,
    peers: Arc<PeerTable>,
    ifconfig: Arc<MockIfconfig>,
    established: Arc<AtomicUsize>,
    client: KeyPair,
    ephemeral: KeyPair,
    server_public: [u8; 32],
}

fn fixture(configure: impl FnOnce(&mut Config)) -> Fixture {
    let server_keys = KeyPair::from_hex(SERVER_SECRET).unwrap();
    let server_public = *server_keys.public();

    let established = Arc::new(AtomicUsize::new(0));
    let counter = established.clone();
    let mut config = Config::new(server_keys);
    config.establish_peer = Some(Box::new(move |_peer| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    configure(&mut config);

    let peers = Arc::new(PeerTable::new());
    let ifconfig = Arc::new(MockIfconfig::default());
    let handler = Handler::new(Arc::new(config), peers.clone(), ifconfig.clone());

    Fixture {
        handler,
        peers,
        ifconfig,
        established,
        client: KeyPair::from_hex(CLIENT_SECRET).unwrap(),
        ephemeral: KeyPair::from_hex(CLIENT_EPHEMERAL).unwrap(),
        server_public,
    }
}

/// Marshal and reparse, the way a datagram travels, then stamp addresses.
fn over_the_wire(msg: &Message) -> Message {
    let bytes = msg.marshal(false);
    let mut parsed = Message::parse(&bytes, false).unwrap();
    parsed.src = client_addr();
    parsed.dst = server_addr();
    parsed
}

fn build_request(fx: &Fixture) -> Message {
    let mut request = Message::new(MESSAGE_TYPE_HANDSHAKE);
    request
        .records
        .set_handshake_type(HandshakeType::Request)
        .set_mode(Mode::Tun)
        .set_protocol_name(PROTOCOL_NAME)
        .set_sender_key(fx.client.public())
        .set_version_name("v18")
        .set_recipient_key(&fx.server_public)
        .set_sender_handshake_key(fx.ephemeral.public())
        .set_mtu(1406);
    over_the_wire(&request)
}

/// Builds a signed finish from the server's reply, returning the client-side
/// shared key as well.
fn build_finish(fx: &Fixture, reply: &Message) -> (Message, [u8; 32]) {
    let sender_handshake_key: [u8; 32] = reply
        .records
        .sender_handshake_key()
        .unwrap()
        .try_into()
        .unwrap();

    let mut hs = Handshake::with_keys(
        sender_handshake_key,
        fx.ephemeral.clone(),
        Duration::from_secs(3),
    );
    assert!(hs.make_shared_key(true, &fx.client, &fx.server_public));
    let shared_key = *hs.shared_key().unwrap();

    let mut finish = reply.new_reply();
    finish
        .records
        .set_sender_key(fx.client.public())
        .set_recipient_key(&fx.server_public)
        .set_sender_handshake_key(fx.ephemeral.public())
        .set_recipient_handshake_key(&sender_handshake_key)
        .set_mtu(1406)
        .set_method_name("null");
    finish.sign_key = Some(shared_key.to_vec());
    (over_the_wire(&finish), shared_key)
}

#[test]
fn full_handshake() {
    let fx = fixture(|config| {
        config.assign_addresses = Some(Box::new(|peer| {
            peer.ipv4.local = Some(Ipv4Addr::new(192, 168, 23, 2));
            peer.ipv4.dest = Some(Ipv4Addr::new(192, 168, 23, 3));
            peer.vars = b"opaque".to_vec();
        }));
    });

    // request -> reply
    let mut request = build_request(&fx);
    let reply = fx.handler.handle_packet(&mut request).expect("no reply");

    assert_eq!(reply.records.handshake_type(), Some(HandshakeType::Reply));
    assert_eq!(reply.records.reply_code(), Some(ReplyCode::Success));
    assert_eq!(reply.records.protocol_name(), Some(PROTOCOL_NAME));
    assert_eq!(reply.records.version_name(), Some("v18"));
    assert_eq!(reply.records.mtu(), Some(1406));
    assert_eq!(reply.records.sender_key(), Some(&fx.server_public[..]));
    assert_eq!(
        reply.records.recipient_key(),
        Some(&fx.client.public()[..])
    );
    assert_eq!(
        reply.records.recipient_handshake_key(),
        Some(&fx.ephemeral.public()[..])
    );
    assert_eq!(reply.records.get(TlvKey::MethodList), Some(&b"null"[..]));
    assert_eq!(reply.records.get(TlvKey::Vars), Some(&b"opaque"[..]));
    assert_eq!(
        reply.records.get(TlvKey::Ipv4Addr),
        Some(&[192, 168, 23, 2][..])
    );
    assert_eq!(
        reply.records.get(TlvKey::Ipv4DstAddr),
        Some(&[192, 168, 23, 3][..])
    );
    assert_eq!(reply.src, server_addr());
    assert_eq!(reply.dst, client_addr());
    let server_shared = reply.sign_key.clone().expect("reply is unsigned");

    {
        let peers = fx.peers.read();
        let peer = peers.get(&client_addr().raw()).expect("peer missing");
        assert_eq!(peer.public_key.as_ref(), Some(fx.client.public()));
        assert!(peer.handshake.is_some());
        assert_eq!(peer.ifname.as_deref(), Some("fastd0"));
    }

    // finish -> established, no reply
    let (mut finish, client_shared) = build_finish(&fx, &reply);
    assert_eq!(server_shared, client_shared.to_vec());

    assert!(fx.handler.handle_packet(&mut finish).is_none());
    assert_eq!(fx.established.load(Ordering::SeqCst), 1);

    let peers = fx.peers.read();
    let peer = peers.get(&client_addr().raw()).unwrap();
    assert!(peer.handshake.is_none());
    assert_eq!(peer.mtu, 1406);
    assert_eq!(
        *fx.ifconfig.mtus.lock().unwrap(),
        vec![("fastd0".to_string(), 1406)]
    );
    assert_eq!(fx.ifconfig.addrs.lock().unwrap().len(), 1);
}

#[test]
fn missing_records_are_diagnosed() {
    for key in [
        TlvKey::SenderKey,
        TlvKey::RecipientKey,
        TlvKey::SenderHandshakeKey,
    ] {
        let fx = fixture(|_| {});
        let mut request = build_request(&fx);
        let without = {
            let mut msg = Message::new(MESSAGE_TYPE_HANDSHAKE);
            for (k, v) in request.records.iter() {
                if k != key {
                    msg.records.set(k, v.to_vec());
                }
            }
            over_the_wire(&msg)
        };
        request = without;

        let reply = fx.handler.handle_packet(&mut request).expect("no reply");
        assert_eq!(reply.records.reply_code(), Some(ReplyCode::RecordMissing));
        assert_eq!(
            reply.records.get(TlvKey::ErrorDetail),
            Some(&(key as u16).to_le_bytes()[..])
        );
    }
}

#[test]
fn wrong_recipient_key_is_unacceptable() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    request.records.set_recipient_key(&[0x5a; 32]);
    let mut request = over_the_wire(&request);

    let reply = fx.handler.handle_packet(&mut request).expect("no reply");
    assert_eq!(
        reply.records.reply_code(),
        Some(ReplyCode::UnacceptableValue)
    );
    assert_eq!(
        reply.records.get(TlvKey::ErrorDetail),
        Some(&(TlvKey::RecipientKey as u16).to_le_bytes()[..])
    );
}

#[test]
fn reflected_packet_is_dropped() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    request.src = server_addr();
    request.dst = server_addr();
    assert!(fx.handler.handle_packet(&mut request).is_none());
    assert!(fx.peers.is_empty());
}

#[test]
fn changed_sender_key_is_dropped() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    assert!(fx.handler.handle_packet(&mut request).is_some());

    // same source address, different identity
    let other = KeyPair::random();
    let mut second = build_request(&fx);
    second.records.set_sender_key(other.public());
    let mut second = over_the_wire(&second);

    assert!(fx.handler.handle_packet(&mut second).is_none());
    let peers = fx.peers.read();
    let peer = peers.get(&client_addr().raw()).unwrap();
    assert_eq!(peer.public_key.as_ref(), Some(fx.client.public()));
}

#[test]
fn rejected_peer_is_removed() {
    let fx = fixture(|config| {
        config.verify_peer = Some(Box::new(|_peer| false));
    });
    let mut request = build_request(&fx);
    assert!(fx.handler.handle_packet(&mut request).is_none());
    assert!(fx.peers.is_empty());
    assert_eq!(fx.ifconfig.created.load(Ordering::SeqCst), 0);
}

#[test]
fn finish_without_request_is_dropped() {
    let fx = fixture(|_| {});
    let mut finish = build_request(&fx);
    finish
        .records
        .set_handshake_type(HandshakeType::Finish)
        .set_method_name("null");
    let mut finish = over_the_wire(&finish);

    assert!(fx.handler.handle_packet(&mut finish).is_none());
    assert_eq!(fx.established.load(Ordering::SeqCst), 0);
}

#[test]
fn finish_with_wrong_method_gets_reply() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    let reply = fx.handler.handle_packet(&mut request).unwrap();

    let (finish, _) = build_finish(&fx, &reply);
    let mut finish_bad = finish.clone();
    finish_bad.records.set_method_name("salsa2012+umac");
    let mut finish_bad = over_the_wire(&finish_bad);

    let answer = fx.handler.handle_packet(&mut finish_bad).expect("no reply");
    assert_eq!(
        answer.records.reply_code(),
        Some(ReplyCode::UnacceptableValue)
    );
    assert_eq!(
        answer.records.get(TlvKey::ErrorDetail),
        Some(&(TlvKey::MethodName as u16).to_le_bytes()[..])
    );
    assert_eq!(fx.established.load(Ordering::SeqCst), 0);
}

#[test]
fn finish_with_bad_signature_is_dropped() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    let reply = fx.handler.handle_packet(&mut request).unwrap();

    let (mut finish, _) = build_finish(&fx, &reply);
    // re-sign with a wrong key, keeping everything else intact
    finish.sign_key = Some(vec![0x13; 32]);
    let mut finish = over_the_wire(&finish);

    assert!(fx.handler.handle_packet(&mut finish).is_none());
    assert_eq!(fx.established.load(Ordering::SeqCst), 0);

    let peers = fx.peers.read();
    let peer = peers.get(&client_addr().raw()).unwrap();
    assert!(peer.handshake.is_some());
}

#[test]
fn finish_with_small_mtu_is_dropped() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    let reply = fx.handler.handle_packet(&mut request).unwrap();

    let sender_handshake_key: [u8; 32] = reply
        .records
        .sender_handshake_key()
        .unwrap()
        .try_into()
        .unwrap();
    let mut hs = Handshake::with_keys(
        sender_handshake_key,
        fx.ephemeral.clone(),
        Duration::from_secs(3),
    );
    assert!(hs.make_shared_key(true, &fx.client, &fx.server_public));

    let mut finish = reply.new_reply();
    finish
        .records
        .set_sender_key(fx.client.public())
        .set_recipient_key(&fx.server_public)
        .set_sender_handshake_key(fx.ephemeral.public())
        .set_mtu(512)
        .set_method_name("null");
    finish.sign_key = Some(hs.shared_key().unwrap().to_vec());
    let mut finish = over_the_wire(&finish);

    assert!(fx.handler.handle_packet(&mut finish).is_none());
    assert_eq!(fx.established.load(Ordering::SeqCst), 0);
}

#[test]
fn expired_handshake_is_dropped() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    assert!(fx.handler.handle_packet(&mut request).is_some());

    // swap in a responder handshake whose deadline has already passed
    let server_keys = KeyPair::from_hex(SERVER_SECRET).unwrap();
    let server_ephemeral = KeyPair::random();
    let mut hs = Handshake::with_keys(
        *fx.ephemeral.public(),
        server_ephemeral,
        Duration::ZERO,
    );
    assert!(hs.make_shared_key(false, &server_keys, fx.client.public()));
    let server_hs_public = *hs.our_public();
    {
        let mut peers = fx.peers.write();
        let peer = peers.get_mut(&client_addr().raw()).unwrap();
        peer.handshake = Some(hs);
    }

    let mut client_hs = Handshake::with_keys(
        server_hs_public,
        fx.ephemeral.clone(),
        Duration::from_secs(3),
    );
    assert!(client_hs.make_shared_key(true, &fx.client, &fx.server_public));

    let mut finish = Message::new(MESSAGE_TYPE_HANDSHAKE);
    finish
        .records
        .set_handshake_type(HandshakeType::Finish)
        .set_mode(Mode::Tun)
        .set_protocol_name(PROTOCOL_NAME)
        .set_sender_key(fx.client.public())
        .set_recipient_key(&fx.server_public)
        .set_sender_handshake_key(fx.ephemeral.public())
        .set_recipient_handshake_key(&server_hs_public)
        .set_mtu(1406)
        .set_method_name("null");
    finish.sign_key = Some(client_hs.shared_key().unwrap().to_vec());
    let mut finish = over_the_wire(&finish);

    assert!(fx.handler.handle_packet(&mut finish).is_none());
    assert_eq!(fx.established.load(Ordering::SeqCst), 0);
}

#[test]
fn v20_client_gets_v20_reply() {
    let fx = fixture(|_| {});
    let mut request = build_request(&fx);
    request.records.set_version_name("v21");
    let mut request = over_the_wire(&request);

    let reply = fx.handler.handle_packet(&mut request).unwrap();
    assert_eq!(reply.records.version_name(), Some("v20"));
}
