use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use common::node_api::NodeDescriptor;

use crate::core::coordinator::{Coordinator, CoordinatorConfig};
use crate::core::metadata::HttpMetadataClient;
use crate::core::placement::{PlacementStrategy, RandomPlacement, RendezvousPlacement};
use crate::core::registry::{ConnectionRegistry, HttpConnector};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Placement {
    Random,
    Rendezvous,
}

impl Placement {
    pub fn strategy(self) -> Arc<dyn PlacementStrategy> {
        match self {
            Placement::Random => Arc::new(RandomPlacement),
            Placement::Rendezvous => Arc::new(RendezvousPlacement),
        }
    }
}

/// Cluster membership and coordinator tuning shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Storage node, as <node_id>=<address>/<service_name>; repeatable
    #[arg(long = "node", required = true)]
    pub nodes: Vec<NodeDescriptor>,

    /// Number of replicas per file
    #[arg(long, default_value_t = 2)]
    pub replication_factor: usize,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub store_timeout: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "15s")]
    pub delete_timeout: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "20s")]
    pub verify_timeout: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub stats_timeout: Duration,

    /// Max concurrent node calls
    #[arg(long, default_value_t = 10)]
    pub worker_pool_size: usize,

    #[arg(long, value_enum, default_value_t = Placement::Random)]
    pub placement: Placement,

    /// Metadata store endpoint; file records are not published when unset
    #[arg(long)]
    pub metadata_url: Option<String>,

    /// Per-request timeout for node calls (seconds)
    #[arg(long, default_value_t = 10)]
    pub http_timeout_secs: u64,
}

impl NodeArgs {
    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            replication_factor: self.replication_factor,
            store_timeout: self.store_timeout,
            delete_timeout: self.delete_timeout,
            verify_timeout: self.verify_timeout,
            stats_timeout: self.stats_timeout,
            worker_pool_size: self.worker_pool_size,
        }
    }
}

pub fn http_client(timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

pub fn build_coordinator(args: &NodeArgs) -> Result<Coordinator> {
    if args.replication_factor == 0 {
        bail!("replication factor must be at least 1");
    }

    let mut seen = HashSet::new();
    for d in &args.nodes {
        if !seen.insert(d.node_id.as_str()) {
            bail!("duplicate node id {}", d.node_id);
        }
    }

    let http = http_client(args.http_timeout_secs)?;
    let registry = ConnectionRegistry::new(
        args.nodes.clone(),
        Arc::new(HttpConnector::new(http.clone())),
    );

    let placement = args.placement.strategy();
    let placement_name = placement.name();
    let mut coordinator = Coordinator::new(registry, args.config()).with_placement(placement);

    if let Some(url) = &args.metadata_url {
        coordinator = coordinator.with_metadata(Arc::new(HttpMetadataClient::new(http, url)));
    }

    info!(
        nodes = args.nodes.len(),
        replication_factor = args.replication_factor,
        placement = placement_name,
        "coordinator configured"
    );

    Ok(coordinator)
}
