//! Frontier entries and their lifecycle

use crate::citation::NodeId;
use citegraph_common::errors::{AppError, FetchFailureKind};
use citegraph_common::record::LookupKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Which citation list an entry expands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow references (works the record cites)
    Forward,
    /// Follow cited-by (works citing the record)
    Backward,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Backward];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" | "references" => Ok(Direction::Forward),
            "backward" | "cited_by" | "cited-by" => Ok(Direction::Backward),
            other => Err(AppError::InvalidOption {
                field: "directions".to_string(),
                message: format!("unknown direction '{}'", other),
            }),
        }
    }
}

/// A pending unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub key: LookupKey,
    pub depth: u32,
    pub direction: Direction,
    /// Nodes whose expansion enqueued this entry
    pub parents: Vec<NodeId>,
}

/// Why an entry produced no new work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyVisited,
    DepthLimit,
    NodeBudget,
    InvalidRecord { message: String },
    PreviouslyFailed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyVisited => "already_visited",
            SkipReason::DepthLimit => "depth_limit",
            SkipReason::NodeBudget => "node_budget",
            SkipReason::InvalidRecord { .. } => "invalid_record",
            SkipReason::PreviouslyFailed => "previously_failed",
        }
    }
}

/// Entry lifecycle: Pending -> Fetching -> Resolved | Skipped | Failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntryState {
    Pending,
    Fetching,
    Resolved { node: NodeId },
    Skipped(SkipReason),
    Failed { kind: FetchFailureKind },
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Fetching => "fetching",
            EntryState::Resolved { .. } => "resolved",
            EntryState::Skipped(_) => "skipped",
            EntryState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EntryState::Pending | EntryState::Fetching)
    }
}

/// Entries of one depth, deduplicated on (key, direction).
///
/// Re-enqueueing a key merges its parent list instead of adding a second
/// entry.
#[derive(Debug, Default)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
    positions: HashMap<(LookupKey, Direction), usize>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `key`; returns true when it was not pending yet
    pub fn push(&mut self, key: LookupKey, depth: u32, direction: Direction, parent: Option<NodeId>) -> bool {
        if let Some(&position) = self.positions.get(&(key.clone(), direction)) {
            let entry = &mut self.entries[position];
            if let Some(parent) = parent {
                if !entry.parents.contains(&parent) {
                    entry.parents.push(parent);
                }
            }
            return false;
        }

        self.positions.insert((key.clone(), direction), self.entries.len());
        self.entries.push(FrontierEntry {
            key,
            depth,
            direction,
            parents: parent.into_iter().collect(),
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by key then direction, whatever order they were
    /// enqueued in
    pub fn into_entries(self) -> Vec<FrontierEntry> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| (&a.key, a.direction).cmp(&(&b.key, b.direction)));
        entries
    }
}
