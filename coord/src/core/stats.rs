use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use common::node_api::NodeInfo;

pub const EXCELLENT_NODES: f64 = 100.0;
pub const EXCELLENT_SUCCESS: f64 = 95.0;
pub const GOOD_NODES: f64 = 80.0;
pub const GOOD_SUCCESS: f64 = 90.0;
pub const ACCEPTABLE_NODES: f64 = 60.0;
pub const ACCEPTABLE_SUCCESS: f64 = 80.0;
pub const CRITICAL_NODES: f64 = 40.0;
pub const CRITICAL_SUCCESS: f64 = 60.0;

/// Store/retrieve/delete outcome counters. The total is derived from the two
/// stored counts, so `total == successful + failed` holds in every snapshot.
#[derive(Debug, Default)]
pub struct OpCounters {
    successful: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpSnapshot {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

impl OpCounters {
    pub fn record<T, E>(&self, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> OpSnapshot {
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        OpSnapshot {
            total: successful + failed,
            successful,
            failed,
        }
    }

    pub fn reset(&self) {
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

impl OpSnapshot {
    /// Percentage of successful operations; 100 before anything ran.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.successful as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemHealth {
    Excellent,
    Good,
    Acceptable,
    Critical,
    Emergency,
}

impl SystemHealth {
    pub fn assess(node_availability_pct: f64, success_rate: f64) -> Self {
        let (n, s) = (node_availability_pct, success_rate);
        if n >= EXCELLENT_NODES && s >= EXCELLENT_SUCCESS {
            SystemHealth::Excellent
        } else if n >= GOOD_NODES && s >= GOOD_SUCCESS {
            SystemHealth::Good
        } else if n >= ACCEPTABLE_NODES && s >= ACCEPTABLE_SUCCESS {
            SystemHealth::Acceptable
        } else if n >= CRITICAL_NODES && s >= CRITICAL_SUCCESS {
            SystemHealth::Critical
        } else {
            SystemHealth::Emergency
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Answered the liveness probe and reported its capacity.
    Active,
    /// Answered the liveness probe but `describe` failed or was too slow.
    Error,
    /// Did not answer the liveness probe.
    Offline,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeStatistics {
    pub node_id: String,
    pub status: NodeState,
    pub healthy: bool,
    pub total_capacity: u64,
    pub used_capacity: u64,
    pub available_capacity: u64,
    pub utilization_percentage: f64,
    pub files_stored: u64,
    pub uptime_secs: u64,
    pub last_checked_ms: Option<i64>,
}

impl NodeStatistics {
    pub fn active(info: &NodeInfo, last_checked_ms: Option<i64>) -> Self {
        Self {
            node_id: info.node_id.clone(),
            status: NodeState::Active,
            healthy: true,
            total_capacity: info.total_capacity,
            used_capacity: info.used_capacity,
            available_capacity: info.available_capacity,
            utilization_percentage: info.usage_percentage(),
            files_stored: info.stored_files,
            uptime_secs: info.uptime_secs,
            last_checked_ms,
        }
    }

    pub fn unavailable(node_id: &str, status: NodeState, last_checked_ms: Option<i64>) -> Self {
        Self {
            node_id: node_id.to_string(),
            status,
            healthy: false,
            total_capacity: 0,
            used_capacity: 0,
            available_capacity: 0,
            utilization_percentage: 0.0,
            files_stored: 0,
            uptime_secs: 0,
            last_checked_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SystemStatistics {
    pub total_storage_nodes: usize,
    pub active_nodes: usize,
    pub inactive_nodes: usize,
    pub total_stored_files: u64,
    pub total_capacity: u64,
    pub used_capacity: u64,
    pub available_capacity: u64,
    pub storage_utilization_percentage: f64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub success_rate: f64,
    pub system_health: SystemHealth,
    pub nodes: Vec<NodeStatistics>,
    pub generated_at_ms: i64,
}

impl SystemStatistics {
    pub fn aggregate(nodes: Vec<NodeStatistics>, ops: OpSnapshot, generated_at_ms: i64) -> Self {
        let total_storage_nodes = nodes.len();
        // reachable nodes count as active even when `describe` failed
        let active_nodes = nodes.iter().filter(|n| n.status != NodeState::Offline).count();
        let active: Vec<&NodeStatistics> =
            nodes.iter().filter(|n| n.status == NodeState::Active).collect();

        let total_capacity: u64 = active.iter().map(|n| n.total_capacity).sum();
        let used_capacity: u64 = active.iter().map(|n| n.used_capacity).sum();
        let available_capacity: u64 = active.iter().map(|n| n.available_capacity).sum();
        let total_stored_files: u64 = active.iter().map(|n| n.files_stored).sum();

        let storage_utilization_percentage = if total_capacity == 0 {
            0.0
        } else {
            used_capacity as f64 / total_capacity as f64 * 100.0
        };
        let node_availability = if total_storage_nodes == 0 {
            0.0
        } else {
            active_nodes as f64 / total_storage_nodes as f64 * 100.0
        };
        let success_rate = ops.success_rate();

        Self {
            total_storage_nodes,
            active_nodes,
            inactive_nodes: total_storage_nodes - active_nodes,
            total_stored_files,
            total_capacity,
            used_capacity,
            available_capacity,
            storage_utilization_percentage,
            total_operations: ops.total,
            successful_operations: ops.successful,
            failed_operations: ops.failed,
            success_rate,
            system_health: SystemHealth::assess(node_availability, success_rate),
            nodes,
            generated_at_ms,
        }
    }
}

impl fmt::Display for SystemStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "System health: {:?}", self.system_health)?;
        writeln!(
            f,
            "  nodes:      {}/{} active",
            self.active_nodes, self.total_storage_nodes
        )?;
        writeln!(
            f,
            "  storage:    {} / {} bytes used ({:.1}%), {} files",
            self.used_capacity,
            self.total_capacity,
            self.storage_utilization_percentage,
            self.total_stored_files
        )?;
        write!(
            f,
            "  operations: {} total, {} ok, {} failed ({:.1}% success)",
            self.total_operations,
            self.successful_operations,
            self.failed_operations,
            self.success_rate
        )?;
        for n in &self.nodes {
            write!(
                f,
                "\n  - {:<20} {:?} files={} used={:.1}%",
                n.node_id, n.status, n.files_stored, n.utilization_percentage
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, files: u64) -> NodeInfo {
        NodeInfo {
            node_id: id.to_string(),
            total_capacity: 1000,
            used_capacity: 250,
            available_capacity: 750,
            stored_files: files,
            uptime_secs: 1,
        }
    }

    #[test]
    fn counters_total_is_sum() {
        let c = OpCounters::default();
        c.record::<(), ()>(&Ok(()));
        c.record::<(), ()>(&Ok(()));
        c.record::<(), ()>(&Err(()));
        let s = c.snapshot();
        assert_eq!((s.total, s.successful, s.failed), (3, 2, 1));

        c.reset();
        assert_eq!(c.snapshot(), OpSnapshot::default());
    }

    #[test]
    fn success_rate_is_full_before_any_operation() {
        assert_eq!(OpSnapshot::default().success_rate(), 100.0);
    }

    #[test]
    fn health_ladder() {
        assert_eq!(SystemHealth::assess(100.0, 100.0), SystemHealth::Excellent);
        assert_eq!(SystemHealth::assess(100.0, 94.0), SystemHealth::Good);
        assert_eq!(SystemHealth::assess(66.7, 100.0), SystemHealth::Acceptable);
        assert_eq!(SystemHealth::assess(50.0, 100.0), SystemHealth::Critical);
        assert_eq!(SystemHealth::assess(100.0, 10.0), SystemHealth::Emergency);
        assert_eq!(SystemHealth::assess(0.0, 100.0), SystemHealth::Emergency);
    }

    #[test]
    fn aggregate_accounts_for_every_node() {
        let nodes = vec![
            NodeStatistics::active(&info("n1", 2), Some(1)),
            NodeStatistics::active(&info("n2", 3), Some(1)),
            NodeStatistics::unavailable("n3", NodeState::Error, None),
            NodeStatistics::unavailable("n4", NodeState::Offline, None),
        ];
        let s = SystemStatistics::aggregate(nodes, OpSnapshot::default(), 0);

        assert_eq!(s.total_storage_nodes, 4);
        assert_eq!(s.active_nodes, 3);
        assert_eq!(s.inactive_nodes, 1);
        assert_eq!(s.total_stored_files, 5);
        assert_eq!(s.total_capacity, 2000);
        assert_eq!(s.storage_utilization_percentage, 25.0);
        assert_eq!(s.system_health, SystemHealth::Acceptable);
    }
}
