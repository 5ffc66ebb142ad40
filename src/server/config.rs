use crate::codec::Sockaddr;
use crate::crypto::KeyPair;
use crate::server::peer::Peer;
use std::time::Duration;

/// Decides whether a handshake request from this peer is acceptable
pub type VerifyHook = Box<dyn Fn(&Peer) -> bool + Send + Sync>;
/// Observes an established or timed-out peer
pub type PeerHook = Box<dyn Fn(&Peer) + Send + Sync>;
/// Assigns point-to-point addresses and Vars before the reply is built
pub type AssignAddressesHook = Box<dyn Fn(&mut Peer) + Send + Sync>;

pub struct Config {
    /// Addresses the datapath listens on
    pub bind: Vec<Sockaddr>,
    /// Idle time after which a silent peer is evicted
    pub timeout: Duration,
    pub server_keys: KeyPair,
    pub verify_peer: Option<VerifyHook>,
    pub establish_peer: Option<PeerHook>,
    pub on_timeout: Option<PeerHook>,
    pub assign_addresses: Option<AssignAddressesHook>,
}

impl Config {
    pub fn new(server_keys: KeyPair) -> Config {
        Config {
            bind: Vec::new(),
            timeout: Duration::from_secs(300),
            server_keys,
            verify_peer: None,
            establish_peer: None,
            on_timeout: None,
            assign_addresses: None,
        }
    }
}
