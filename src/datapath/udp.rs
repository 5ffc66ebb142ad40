//! Userspace UDP transport
//!
//! One socket per bind address, each with its own read loop feeding the
//! shared inbound queue. The UDP frames carry no sockaddrs; the source comes
//! from the kernel and the destination is the socket's bind address. This
//! transport keeps no session state across restarts.

use crate::codec::{Message, Sockaddr};
use socket2::{Domain, Protocol, Socket, Type};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const BUFFER_SIZE: usize = 1500;

pub struct UdpDatapath {
    sockets: Vec<(Sockaddr, Arc<UdpSocket>)>,
    token: CancellationToken,
}

impl UdpDatapath {
    pub(crate) async fn open(
        binds: &[Sockaddr],
        inbound: mpsc::Sender<Message>,
    ) -> crate::Result<UdpDatapath> {
        let token = CancellationToken::new();
        let mut sockets = Vec::with_capacity(binds.len());

        for bind in binds {
            let socket = bind_socket(bind)?;
            let local: Sockaddr = socket.local_addr()?.into();
            tracing::info!("listening on {}", local);

            let socket = Arc::new(socket);
            sockets.push((local, socket.clone()));
            tokio::spawn(read_loop(
                socket,
                local,
                inbound.clone(),
                token.child_token(),
            ));
        }

        Ok(UdpDatapath { sockets, token })
    }

    /// Picks the bound socket matching the address family of the message
    /// source and transmits to the destination.
    pub(crate) async fn send(&self, msg: &Message) -> crate::Result<()> {
        let socket = self
            .sockets
            .iter()
            .find(|(local, _)| local.is_ipv4() == msg.src.is_ipv4())
            .map(|(_, socket)| socket)
            .ok_or_else(|| format!("no local connection with address {}", msg.src))?;

        socket
            .send_to(&msg.marshal(false), msg.dst.socket_addr())
            .await?;
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.token.cancel();
    }
}

fn bind_socket(bind: &Sockaddr) -> crate::Result<UdpSocket> {
    let addr = bind.socket_addr();
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    local: Sockaddr,
    inbound: mpsc::Sender<Message>,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            result = socket.recv_from(&mut buf) => {
                let (len, src) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!("error reading from UDP: {}", e);
                        break;
                    }
                };

                let mut msg = match Message::parse(&buf[..len], false) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!("dropping packet from {}: {}", src, e);
                        continue;
                    }
                };
                msg.src = src.into();
                msg.dst = local;

                // Backpressure: a slow worker stalls ingestion here
                if inbound.send(msg).await.is_err() {
                    break;
                }
            }
        }
    }
}
