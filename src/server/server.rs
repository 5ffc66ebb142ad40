use crate::codec::Message;
use crate::datapath::{Datapath, DatapathKind, INBOUND_QUEUE};
use crate::iface::Ifconfig;
use crate::server::config::Config;
use crate::server::handler::Handler;
use crate::server::peer::{Peer, PeerTable};
use crate::server::sweeper;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The running fastd server: datapath, handshake worker and sweeper
pub struct Server {
    peers: Arc<PeerTable>,
    datapath: Arc<Datapath>,
    token: CancellationToken,
    worker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Server {
    /// Binds the datapath, seeds the peer table from persisted sessions and
    /// starts the worker and sweeper tasks.
    pub async fn start(
        config: Config,
        kind: DatapathKind,
        ifconfig: Arc<dyn Ifconfig>,
    ) -> crate::Result<Server> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let datapath = Arc::new(Datapath::open(kind, &config.bind, inbound_tx).await?);

        // Enumeration runs synchronously before the worker starts
        let peers = Arc::new(PeerTable::new());
        for initial in datapath.peers(&*ifconfig) {
            let mut peer = Peer::new(initial.remote);
            peer.ifname = Some(initial.ifname);
            peer.public_key = Some(initial.public_key);
            peers.insert(peer);
        }

        let config = Arc::new(config);
        let handler = Handler::new(config.clone(), peers.clone(), ifconfig.clone());
        let token = CancellationToken::new();

        let worker = tokio::spawn(worker(inbound_rx, handler, datapath.clone()));
        let sweeper = tokio::spawn(sweeper::run(
            peers.clone(),
            config,
            ifconfig,
            token.child_token(),
        ));

        Ok(Server {
            peers,
            datapath,
            token,
            worker,
            sweeper,
        })
    }

    pub fn peers(&self) -> Arc<PeerTable> {
        self.peers.clone()
    }

    /// Closes the datapath, stops the sweeper and waits for both tasks.
    pub async fn stop(self) {
        self.datapath.close();
        self.token.cancel();
        let _ = self.worker.await;
        let _ = self.sweeper.await;
    }
}

/// Drives the handshake engine; the single consumer serialises all peer
/// mutations. Each reply is sent before the next message is taken.
async fn worker(mut inbound: mpsc::Receiver<Message>, handler: Handler, datapath: Arc<Datapath>) {
    while let Some(mut msg) = inbound.recv().await {
        if let Some(reply) = handler.handle_packet(&mut msg) {
            if let Err(e) = datapath.send(&reply).await {
                tracing::error!("sending reply to {} failed: {}", reply.dst, e);
            }
        }
    }
}
