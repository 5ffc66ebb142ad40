//! Periodic liveness sweep
//!
//! Data traffic never reaches the userspace worker, so peer liveness is
//! inferred from the interface RX counters: a peer whose counter advanced
//! since the previous tick is alive no matter how old its `last_seen` is.
//! Peers silent for longer than the configured timeout are evicted and their
//! interfaces destroyed.

use crate::iface::Ifconfig;
use crate::server::config::Config;
use crate::server::peer::{Peer, PeerTable};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

pub(crate) async fn run(
    peers: Arc<PeerTable>,
    config: Arc<Config>,
    ifconfig: Arc<dyn Ifconfig>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + SWEEP_INTERVAL,
        SWEEP_INTERVAL,
    );
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => sweep(&peers, &config, &*ifconfig),
        }
    }
}

/// One pass over all peers, holding the write lock throughout.
pub(crate) fn sweep(peers: &PeerTable, config: &Config, ifconfig: &dyn Ifconfig) {
    let now = Instant::now();
    let mut map = peers.write();

    let mut expired = Vec::new();
    for (raw, peer) in map.iter_mut() {
        if counter_advanced(peer, ifconfig) {
            peer.last_seen = now;
            continue;
        }
        if now.duration_since(peer.last_seen) > config.timeout {
            expired.push(*raw);
        }
    }

    for raw in expired {
        if let Some(peer) = map.get(&raw) {
            tracing::info!(
                "peer {} timed out (interface {})",
                peer.remote,
                peer.ifname.as_deref().unwrap_or("-")
            );
            if let Some(on_timeout) = &config.on_timeout {
                on_timeout(peer);
            }
        }
        PeerTable::remove_locked(&mut map, &raw, ifconfig);
    }
}

/// Returns true if the interface RX counter moved since the last tick.
/// A counter read failure counts as no progress.
fn counter_advanced(peer: &mut Peer, ifconfig: &dyn Ifconfig) -> bool {
    let Some(ifname) = &peer.ifname else {
        return false;
    };
    match ifconfig.stats(ifname) {
        Ok(stats) if stats.ipackets != peer.ipackets => {
            peer.ipackets = stats.ipackets;
            true
        }
        Ok(_) => false,
        Err(e) => {
            tracing::error!("unable to get stats for {}: {}", ifname, e);
            false
        }
    }
}
