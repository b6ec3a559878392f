use axum_server::Server;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use common::node_api::{NodeDescriptor, StorageNode};
use common::node_client::HttpNodeClient;
use common::telemetry::init_telemetry;
use common::url_utils::parse_socket_addr;

use volume::health::peer_health_loop;
use volume::replicate::{Peer, PropagatorConfig, propagator};
use volume::routes::build_router;
use volume::state::VolumeState;
use volume::store::LocalStore;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Node root directory; will create subdirs {data,metadata,tmp}
    #[arg(long, default_value = "./node-data")]
    data: PathBuf,

    #[arg(long, default_value = "storage-node-1")]
    node_id: String,

    /// Path prefix the contract routes are served under
    #[arg(long, default_value = "StorageNode1")]
    service_name: String,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3001")]
    listen: String,

    /// Replication peer, as <node_id>=<address>/<service_name>; repeatable
    #[arg(long = "peer")]
    peers: Vec<NodeDescriptor>,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    propagation_interval: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    propagation_delay: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    peer_check_interval: Duration,

    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,

    #[arg(long, default_value_t = 10)]
    http_timeout_secs: u64,

    /// Max accepted file size in bytes (default: 1 GiB)
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    max_file_size: usize,

    /// Mount the /admin fault injection routes (test clusters only)
    #[arg(long, default_value_t = false)]
    enable_fault_injection: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("volume");

    let args = Args::parse();

    let store = Arc::new(LocalStore::open(&args.data, &args.node_id).await?);
    let mut state = VolumeState::new(store.clone(), &args.service_name);
    state.max_file_size = args.max_file_size;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel::<bool>(false);
    let mut background = Vec::new();

    if !args.peers.is_empty() {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(args.http_timeout_secs))
            .build()?;

        let peers: Vec<Peer> = args
            .peers
            .iter()
            .map(|d| {
                let client = HttpNodeClient::new(http_client.clone(), d).replicated_from(&args.node_id);
                (d.node_id.clone(), Arc::new(client) as Arc<dyn StorageNode>)
            })
            .collect();

        let config = PropagatorConfig {
            queue_capacity: args.queue_capacity,
            initial_delay: args.propagation_delay,
            drain_interval: args.propagation_interval,
            peer_check_interval: args.peer_check_interval,
        };

        let (handle, worker) = propagator(store.clone(), peers.clone(), config.clone());
        state = state.with_propagation(handle);

        background.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        background.push(tokio::spawn(peer_health_loop(
            args.node_id.clone(),
            peers,
            config.peer_check_interval,
            shutdown_rx.clone(),
        )));

        info!(peers = args.peers.len(), "replication propagation enabled");
    }

    let app = build_router(state, args.enable_fault_injection);

    let socket_addr = parse_socket_addr(&args.listen)?;
    let server = Server::bind(socket_addr).serve(app.into_make_service());

    info!(node_id = %args.node_id, service = %args.service_name, "listening on {}", args.listen);

    // Graceful shutdown: ctrl+c
    tokio::select! {
        res = server => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    for handle in background {
        let _ = handle.await;
    }

    Ok(())
}
