//! Packet transport for the handshake server
//!
//! Two transports exist: a userspace UDP multiplexer and the fastd kernel
//! character device. They share no state and differ in whether the framed
//! packets carry the source and destination sockaddrs inline, so they are
//! dispatched as enum variants rather than through a trait object.

pub mod kernel;
pub mod udp;

use crate::codec::{Message, Sockaddr};
use crate::crypto::KEY_SIZE;
use crate::iface::Ifconfig;
use kernel::KernelDatapath;
use tokio::sync::mpsc;
use udp::UdpDatapath;

/// Capacity of the inbound message queue between the read loops and the
/// handshake worker
pub const INBOUND_QUEUE: usize = 10;

/// Which transport to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatapathKind {
    Udp,
    Kernel,
}

/// A session recovered from an existing tunnel interface at startup
#[derive(Debug, Clone)]
pub struct InitialPeer {
    pub ifname: String,
    pub remote: Sockaddr,
    pub public_key: [u8; KEY_SIZE],
}

pub enum Datapath {
    Udp(UdpDatapath),
    Kernel(KernelDatapath),
}

impl Datapath {
    /// Binds the transport and starts its read loops. Parsed messages are
    /// delivered through `inbound`.
    pub async fn open(
        kind: DatapathKind,
        binds: &[Sockaddr],
        inbound: mpsc::Sender<Message>,
    ) -> crate::Result<Datapath> {
        match kind {
            DatapathKind::Udp => Ok(Datapath::Udp(UdpDatapath::open(binds, inbound).await?)),
            DatapathKind::Kernel => Ok(Datapath::Kernel(KernelDatapath::open(binds, inbound)?)),
        }
    }

    pub async fn send(&self, msg: &Message) -> crate::Result<()> {
        match self {
            Datapath::Udp(udp) => udp.send(msg).await,
            Datapath::Kernel(kernel) => kernel.send(msg),
        }
    }

    /// Stops the read loops; the inbound channel closes once they exit.
    pub fn close(&self) {
        match self {
            Datapath::Udp(udp) => udp.close(),
            Datapath::Kernel(kernel) => kernel.close(),
        }
    }

    /// Enumerates sessions that survived a restart. Only the kernel
    /// transport has persisted state.
    pub fn peers(&self, ifconfig: &dyn Ifconfig) -> Vec<InitialPeer> {
        match self {
            Datapath::Udp(_) => Vec::new(),
            Datapath::Kernel(kernel) => kernel.peers(ifconfig),
        }
    }
}
