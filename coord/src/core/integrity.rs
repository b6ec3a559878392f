//! Checksum voting across replicas and the report built from it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use common::node_api::FileId;
use common::time_utils::utc_now_ms;

pub const PERFECT_THRESHOLD: f64 = 100.0;
pub const GOOD_THRESHOLD: f64 = 80.0;
pub const ACCEPTABLE_THRESHOLD: f64 = 60.0;
pub const CRITICAL_THRESHOLD: f64 = 40.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    Perfect,
    Good,
    Acceptable,
    Critical,
    Emergency,
}

impl IntegrityStatus {
    pub fn from_percentage(pct: f64) -> Self {
        if pct >= PERFECT_THRESHOLD {
            IntegrityStatus::Perfect
        } else if pct >= GOOD_THRESHOLD {
            IntegrityStatus::Good
        } else if pct >= ACCEPTABLE_THRESHOLD {
            IntegrityStatus::Acceptable
        } else if pct >= CRITICAL_THRESHOLD {
            IntegrityStatus::Critical
        } else {
            IntegrityStatus::Emergency
        }
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            IntegrityStatus::Perfect => "none: file intact everywhere",
            IntegrityStatus::Good => "re-replicate the diverging copies",
            IntegrityStatus::Acceptable => "repair diverging replicas soon",
            IntegrityStatus::Critical => "repair urgently",
            IntegrityStatus::Emergency => "file possibly lost: restore from a valid copy or backup",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntegrityReport {
    pub file_id: FileId,
    pub file_name: Option<String>,
    /// Majority checksum, absent when no node returned data.
    pub expected_checksum: Option<String>,
    pub node_checksums: BTreeMap<String, String>,
    pub valid_nodes: Vec<String>,
    pub corrupted_nodes: Vec<String>,
    pub unavailable_nodes: Vec<String>,
    pub total_nodes: usize,
    pub valid_node_count: usize,
    pub integrity_percentage: f64,
    pub is_valid: bool,
    /// Set when two or more checksums shared the highest vote count.
    pub checksum_tie: bool,
    pub status: IntegrityStatus,
    pub recommended_action: String,
    pub checked_at_ms: i64,
}

/// Most frequent checksum. Ties go to the lexicographically smallest value
/// and are reported through the flag.
pub fn majority_checksum<'a>(checksums: impl IntoIterator<Item = &'a str>) -> Option<(String, bool)> {
    let mut votes: HashMap<&str, usize> = HashMap::new();
    for c in checksums {
        *votes.entry(c).or_default() += 1;
    }

    let top = *votes.values().max()?;
    let mut leaders: Vec<&str> = votes
        .into_iter()
        .filter(|(_, n)| *n == top)
        .map(|(c, _)| c)
        .collect();
    leaders.sort_unstable();

    Some((leaders[0].to_string(), leaders.len() > 1))
}

/// `observations` holds one entry per queried node: the checksum of the bytes
/// it returned, or `None` if it failed, returned nothing or missed the deadline.
pub fn build_report(
    file_id: FileId,
    file_name: Option<String>,
    observations: Vec<(String, Option<String>)>,
) -> IntegrityReport {
    let total_nodes = observations.len();
    let node_checksums: BTreeMap<String, String> = observations
        .iter()
        .filter_map(|(node, c)| c.clone().map(|c| (node.clone(), c)))
        .collect();

    let majority = majority_checksum(node_checksums.values().map(String::as_str));
    let (expected_checksum, checksum_tie) = match majority {
        Some((c, tie)) => (Some(c), tie),
        None => (None, false),
    };

    let mut valid_nodes = Vec::new();
    let mut corrupted_nodes = Vec::new();
    let mut unavailable_nodes = Vec::new();
    for (node, checksum) in observations {
        match checksum {
            None => unavailable_nodes.push(node),
            Some(c) if Some(&c) == expected_checksum.as_ref() => valid_nodes.push(node),
            Some(_) => corrupted_nodes.push(node),
        }
    }

    let valid_node_count = valid_nodes.len();
    let integrity_percentage = if total_nodes == 0 {
        0.0
    } else {
        valid_node_count as f64 / total_nodes as f64 * 100.0
    };
    let status = IntegrityStatus::from_percentage(integrity_percentage);

    IntegrityReport {
        file_id,
        file_name,
        expected_checksum,
        node_checksums,
        is_valid: corrupted_nodes.is_empty() && valid_node_count > 0,
        valid_nodes,
        corrupted_nodes,
        unavailable_nodes,
        total_nodes,
        valid_node_count,
        integrity_percentage,
        checksum_tie,
        status,
        recommended_action: status.recommended_action().to_string(),
        checked_at_ms: utc_now_ms(),
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Integrity report for file {}", self.file_id)?;
        if let Some(name) = &self.file_name {
            writeln!(f, "  name:        {}", name)?;
        }
        writeln!(
            f,
            "  expected:    {}{}",
            self.expected_checksum.as_deref().unwrap_or("-"),
            if self.checksum_tie { " (tie)" } else { "" }
        )?;
        writeln!(
            f,
            "  integrity:   {:.1}% ({}/{} nodes) {:?}",
            self.integrity_percentage, self.valid_node_count, self.total_nodes, self.status
        )?;
        writeln!(f, "  valid:       {:?}", self.valid_nodes)?;
        writeln!(f, "  corrupted:   {:?}", self.corrupted_nodes)?;
        writeln!(f, "  unavailable: {:?}", self.unavailable_nodes)?;
        write!(f, "  action:      {}", self.recommended_action)
    }
}
