//! Best-effort mirroring of local writes to peer nodes.
//!
//! Accepted stores and deletes are queued on a bounded channel. A worker keeps
//! the latest record per file id and pushes the batch to every peer on a fixed
//! schedule. Nothing is retried: a failed push is counted, logged and
//! forgotten. Integrity verification from the coordinator is what eventually
//! notices replicas that never caught up.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use common::node_api::{FileId, NodeError, StorageNode};
use common::time_utils::utc_now_ms;

use crate::store::LocalStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropagationOp {
    Store,
    Delete,
}

#[derive(Clone, Debug, Serialize)]
pub struct PropagationRecord {
    pub file_id: FileId,
    pub file_name: String,
    pub op: PropagationOp,
    pub enqueued_at_ms: i64,
}

impl PropagationRecord {
    pub fn new(file_id: FileId, file_name: impl Into<String>, op: PropagationOp) -> Self {
        Self {
            file_id,
            file_name: file_name.into(),
            op,
            enqueued_at_ms: utc_now_ms(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PropagatorConfig {
    pub queue_capacity: usize,
    pub initial_delay: Duration,
    pub drain_interval: Duration,
    pub peer_check_interval: Duration,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            initial_delay: Duration::from_secs(10),
            drain_interval: Duration::from_secs(30),
            peer_check_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    pending: AtomicU64,
    propagated: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropagationStats {
    pub queued: u64,
    pub pending: u64,
    pub propagated: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Producer side, cloned into request handlers.
#[derive(Clone)]
pub struct PropagationHandle {
    tx: mpsc::Sender<PropagationRecord>,
    counters: Arc<Counters>,
}

impl PropagationHandle {
    /// Never blocks; returns `false` if the record was dropped.
    pub fn enqueue(&self, record: PropagationRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(file_id = record.file_id, "propagation queue full, dropping record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(file_id = record.file_id, "propagator stopped, dropping record");
                false
            }
        }
    }

    pub fn stats(&self) -> PropagationStats {
        let c = &self.counters;
        PropagationStats {
            queued: c.queued.load(Ordering::Relaxed),
            pending: c.pending.load(Ordering::Relaxed),
            propagated: c.propagated.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }
}

pub type Peer = (String, Arc<dyn StorageNode>);

pub struct Propagator {
    store: Arc<LocalStore>,
    peers: Vec<Peer>,
    rx: mpsc::Receiver<PropagationRecord>,
    config: PropagatorConfig,
    counters: Arc<Counters>,
}

pub fn propagator(
    store: Arc<LocalStore>,
    peers: Vec<Peer>,
    config: PropagatorConfig,
) -> (PropagationHandle, Propagator) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let counters = Arc::new(Counters::default());
    let handle = PropagationHandle {
        tx,
        counters: counters.clone(),
    };
    let worker = Propagator {
        store,
        peers,
        rx,
        config,
        counters,
    };
    (handle, worker)
}

impl Propagator {
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut pending: HashMap<FileId, PropagationRecord> = HashMap::new();
        let mut drain = interval_at(
            Instant::now() + self.config.initial_delay,
            self.config.drain_interval.max(Duration::from_millis(1)),
        );

        loop {
            tokio::select! {
                Some(record) = self.rx.recv() => {
                    // a later record for the same id supersedes the earlier one
                    pending.insert(record.file_id, record);
                    self.counters.pending.store(pending.len() as u64, Ordering::Relaxed);
                }
                _ = drain.tick() => {
                    if !pending.is_empty() {
                        let batch: Vec<_> = pending.drain().map(|(_, r)| r).collect();
                        self.counters.pending.store(0, Ordering::Relaxed);
                        self.push_batch(batch).await;
                    }
                }
                _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
            }
        }

        info!(pending = pending.len(), "replication propagator stopped");

        Ok(())
    }

    async fn push_batch(&self, batch: Vec<PropagationRecord>) {
        debug!(records = batch.len(), peers = self.peers.len(), "draining propagation queue");
        for record in batch {
            match record.op {
                PropagationOp::Store => self.push_store(&record).await,
                PropagationOp::Delete => self.push_delete(&record).await,
            }
        }
    }

    async fn push_store(&self, record: &PropagationRecord) {
        let Some(meta) = self.store.meta(record.file_id) else {
            debug!(file_id = record.file_id, "file no longer stored locally, skipping");
            return;
        };
        let data = match self.store.retrieve(record.file_id, Some(&meta.blob)).await {
            Ok(data) => data,
            Err(e) => {
                warn!(file_id = record.file_id, "cannot read local copy for propagation: {e}");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        for (peer_id, peer) in &self.peers {
            let res = peer
                .store(record.file_id, &meta.file_name, data.clone(), &meta.checksum)
                .await
                .map(|_| ());
            self.record_outcome(peer_id, record, res);
        }
    }

    async fn push_delete(&self, record: &PropagationRecord) {
        for (peer_id, peer) in &self.peers {
            let res = peer.delete(record.file_id, None).await.map(|_| ());
            self.record_outcome(peer_id, record, res);
        }
    }

    fn record_outcome(&self, peer_id: &str, record: &PropagationRecord, res: Result<(), NodeError>) {
        match res {
            Ok(()) => {
                self.counters.propagated.fetch_add(1, Ordering::Relaxed);
                debug!(peer = peer_id, file_id = record.file_id, op = ?record.op, "propagated");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(peer = peer_id, file_id = record.file_id, op = ?record.op, "propagation failed: {e}");
            }
        }
    }
}
