use axum_server::Server;
use clap::Parser;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use common::url_utils::parse_socket_addr;

use crate::command::common::{NodeArgs, build_coordinator};
use crate::core::health::health_monitor;
use crate::core::routes::build_router;
use crate::core::state::CoordinatorState;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    cluster: NodeArgs,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Max accepted file size in bytes (default: 1 GiB)
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    max_size: usize,

    /// Interval between background node probes
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    health_interval: Duration,
}

pub async fn serve(serve_args: ServeArgs) -> anyhow::Result<()> {
    let coordinator = build_coordinator(&serve_args.cluster)?;

    let state = CoordinatorState {
        coordinator: coordinator.clone(),
        max_size: serve_args.max_size,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);
    let monitor_handle = tokio::spawn(health_monitor(
        coordinator.registry().clone(),
        serve_args.health_interval,
        shutdown_rx,
    ));

    let app = build_router(state);

    let socket_addr = parse_socket_addr(&serve_args.listen)?;
    let server = Server::bind(socket_addr).serve(app.into_make_service());

    info!("listening on {}", serve_args.listen);

    // Graceful shutdown: ctrl+c
    tokio::select! {
        res = server => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;

    Ok(())
}
