use tokio::sync::watch;
use tracing::{debug, info};

use crate::core::registry::ConnectionRegistry;

/// Re-probes every configured node on a fixed interval. The probe itself
/// updates the registry's health map.
pub async fn health_monitor(
    registry: ConnectionRegistry,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        let available = registry.list_available_nodes().await;
        debug!(
            healthy = available.len(),
            configured = registry.descriptors().len(),
            "health check complete"
        );
    }

    info!("health monitor stopped");

    Ok(())
}
