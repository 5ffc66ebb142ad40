use crate::codec::Sockaddr;
use crate::codec::sockaddr::SOCKADDR_SIZE;
use crate::crypto::{Handshake, KEY_SIZE};
use crate::iface::Ifconfig;
use std::any::Any;
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Local and destination address of a point-to-point interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpAddrs<T> {
    pub local: Option<T>,
    pub dest: Option<T>,
}

impl<T> Default for PtpAddrs<T> {
    fn default() -> Self {
        PtpAddrs {
            local: None,
            dest: None,
        }
    }
}

/// Durable state of one remote session
pub struct Peer {
    /// The NAT-visible endpoint the peer talks from
    pub remote: Sockaddr,
    /// Long-term public key; never changes once set
    pub public_key: Option<[u8; KEY_SIZE]>,
    /// Session establishment in progress, cleared on finish
    pub handshake: Option<Handshake>,
    /// Tunnel interface, allocated at most once per peer lifetime
    pub ifname: Option<String>,
    pub mtu: u16,
    pub ipv4: PtpAddrs<Ipv4Addr>,
    pub ipv6: PtpAddrs<Ipv6Addr>,
    /// Opaque bytes the caller wants echoed in the handshake reply
    pub vars: Vec<u8>,
    /// Caller-opaque slot for hook bookkeeping
    pub data: Option<Box<dyn Any + Send + Sync>>,
    pub last_seen: Instant,
    pub(crate) ipackets: u64,
}

impl Peer {
    pub fn new(remote: Sockaddr) -> Peer {
        Peer {
            remote,
            public_key: None,
            handshake: None,
            ifname: None,
            mtu: 0,
            ipv4: PtpAddrs::default(),
            ipv6: PtpAddrs::default(),
            vars: Vec::new(),
            data: None,
            last_seen: Instant::now(),
            ipackets: 0,
        }
    }
}

pub type PeerMap = HashMap<[u8; SOCKADDR_SIZE], Peer>;

/// Registry of active sessions keyed by the raw remote sockaddr
///
/// The handshake worker and the sweeper mutate peers under the write lock;
/// snapshots for metrics take the read lock.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<PeerMap>,
}

impl PeerTable {
    pub fn new() -> PeerTable {
        PeerTable::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PeerMap> {
        self.peers.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PeerMap> {
        self.peers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, peer: Peer) {
        self.write().insert(peer.remote.raw(), peer);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Looks up the peer for `remote`, creating it on first contact.
    pub fn get_or_create(map: &mut PeerMap, remote: Sockaddr) -> (&mut Peer, bool) {
        let mut created = false;
        let peer = map.entry(remote.raw()).or_insert_with(|| {
            created = true;
            Peer::new(remote)
        });
        (peer, created)
    }

    /// Removes a peer under an already-held write lock, tearing down its
    /// tunnel interface.
    pub fn remove_locked(
        map: &mut PeerMap,
        raw: &[u8; SOCKADDR_SIZE],
        ifconfig: &dyn Ifconfig,
    ) -> Option<Peer> {
        let peer = map.remove(raw)?;
        if let Some(ifname) = &peer.ifname {
            if let Err(e) = ifconfig.destroy(ifname) {
                tracing::error!("failed to destroy {}: {}", ifname, e);
            }
        }
        Some(peer)
    }

    pub fn remove(&self, remote: &Sockaddr, ifconfig: &dyn Ifconfig) -> Option<Peer> {
        PeerTable::remove_locked(&mut self.write(), &remote.raw(), ifconfig)
    }
}
