use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::replicate::Peer;

/// Probes each replication peer on a fixed interval. Results are only logged;
/// the propagator pushes to every peer regardless.
pub async fn peer_health_loop(
    node_id: String,
    peers: Vec<Peer>,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        for (peer_id, peer) in &peers {
            match peer.heartbeat().await {
                Ok(true) => debug!(node_id = %node_id, peer = %peer_id, "peer alive"),
                Ok(false) => warn!(node_id = %node_id, peer = %peer_id, "peer reports not alive"),
                Err(e) => warn!(node_id = %node_id, peer = %peer_id, "peer unreachable: {e}"),
            }
        }
    }

    info!("peer health loop stopped");

    Ok(())
}
