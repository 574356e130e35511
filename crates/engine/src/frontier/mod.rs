//! Frontier expansion
//!
//! Breadth-first, depth-bounded expansion of a citation graph from seeds:
//! - Build options and their validation
//! - Cooperative cancellation
//! - Per-run summary

mod entry;
mod expander;

pub use entry::{Direction, EntryState, Frontier, FrontierEntry, SkipReason};
pub use expander::{BuildOutput, FrontierExpander};

use chrono::{DateTime, Utc};
use citegraph_common::cache::FetchStats;
use citegraph_common::config::AppConfig;
use citegraph_common::errors::{FetchFailureKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

/// Options for one build
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BuildOptions {
    /// Seeds are depth 0; nodes at this depth are not expanded
    pub max_depth: u32,

    #[validate(range(min = 1))]
    pub max_nodes: usize,

    #[validate(length(min = 1, message = "at least one direction is required"))]
    pub directions: Vec<Direction>,

    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub title_weight: f64,

    #[validate(range(min = 0))]
    pub year_tolerance: i32,

    /// Fetches in flight per round
    #[validate(range(min = 1, max = 256))]
    pub concurrency: usize,

    /// Search hits taken per free-text seed
    #[validate(range(min = 1, max = 200))]
    pub seed_search_limit: usize,

    /// Wall-clock budget, checked between rounds
    pub max_duration: Option<Duration>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_nodes: 5_000,
            directions: vec![Direction::Forward],
            similarity_threshold: 0.92,
            title_weight: 0.8,
            year_tolerance: 1,
            concurrency: 8,
            seed_search_limit: 1,
            max_duration: None,
        }
    }
}

impl BuildOptions {
    /// Options from loaded configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut directions = Vec::new();
        for raw in &config.traversal.directions {
            let direction: Direction = raw.parse()?;
            if !directions.contains(&direction) {
                directions.push(direction);
            }
        }

        let options = Self {
            max_depth: config.traversal.max_depth,
            max_nodes: config.traversal.max_nodes,
            directions,
            similarity_threshold: config.resolver.similarity_threshold,
            title_weight: config.resolver.title_weight,
            year_tolerance: config.resolver.year_tolerance,
            concurrency: config.fetch.concurrency,
            seed_search_limit: config.traversal.seed_search_limit,
            max_duration: config.max_duration(),
        };
        options.validate()?;
        Ok(options)
    }
}

/// Handle that requests a running build to stop at the next round boundary
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a build ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Nothing left to expand
    FrontierExhausted,
    /// Nothing left to expand within the depth bound
    DepthLimit,
    NodeBudget,
    TimeBudget,
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::FrontierExhausted => "frontier_exhausted",
            TerminationReason::DepthLimit => "depth_limit",
            TerminationReason::NodeBudget => "node_budget",
            TerminationReason::TimeBudget => "time_budget",
            TerminationReason::Cancelled => "cancelled",
        }
    }

    /// Whether work was left undone
    pub fn is_truncated(&self) -> bool {
        matches!(
            self,
            TerminationReason::NodeBudget | TerminationReason::TimeBudget | TerminationReason::Cancelled
        )
    }
}

/// Skipped entry counts by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub already_visited: usize,
    pub depth_limit: usize,
    pub node_budget: usize,
    pub invalid_record: usize,
    pub previously_failed: usize,
}

impl SkipCounts {
    pub fn record(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::AlreadyVisited => self.already_visited += 1,
            SkipReason::DepthLimit => self.depth_limit += 1,
            SkipReason::NodeBudget => self.node_budget += 1,
            SkipReason::InvalidRecord { .. } => self.invalid_record += 1,
            SkipReason::PreviouslyFailed => self.previously_failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.already_visited + self.depth_limit + self.node_budget + self.invalid_record + self.previously_failed
    }
}

/// Failed entry counts by failure kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounts {
    pub transient: usize,
    pub quota_exceeded: usize,
    pub bad_response: usize,
    pub not_found: usize,
}

impl FailureCounts {
    pub fn record(&mut self, kind: FetchFailureKind) {
        match kind {
            FetchFailureKind::Transient => self.transient += 1,
            FetchFailureKind::QuotaExceeded => self.quota_exceeded += 1,
            FetchFailureKind::BadResponse => self.bad_response += 1,
            FetchFailureKind::NotFound => self.not_found += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.transient + self.quota_exceeded + self.bad_response + self.not_found
    }
}

/// Outcome report of one build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub seeds_given: usize,
    pub seeds_resolved: usize,
    pub resolved: usize,
    pub skipped: SkipCounts,
    pub failed: FailureCounts,
    /// Entries left pending when the build stopped early
    pub truncated: usize,
    /// Records matched to an existing node by identifier
    pub matched_by_identifier: usize,
    /// Records merged into an existing node by similarity
    pub merged_by_similarity: usize,
    pub self_loops_rejected: usize,
    pub rounds: u32,
    pub nodes: usize,
    pub edges: usize,
    pub termination: TerminationReason,
    pub fetch: FetchStats,
}

impl RunSummary {
    pub fn new(seeds_given: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            seeds_given,
            seeds_resolved: 0,
            resolved: 0,
            skipped: SkipCounts::default(),
            failed: FailureCounts::default(),
            truncated: 0,
            matched_by_identifier: 0,
            merged_by_similarity: 0,
            self_loops_rejected: 0,
            rounds: 0,
            nodes: 0,
            edges: 0,
            termination: TerminationReason::FrontierExhausted,
            fetch: FetchStats::default(),
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// True when the build ran to a natural end without failures
    pub fn is_complete(&self) -> bool {
        !self.termination.is_truncated() && self.failed.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(BuildOptions::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = BuildOptions {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = BuildOptions {
            directions: vec![],
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = BuildOptions {
            max_nodes: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.traversal.directions = vec!["backward".into(), "forward".into(), "backward".into()];
        config.traversal.max_depth = 3;

        let options = BuildOptions::from_config(&config).unwrap();
        assert_eq!(options.directions, vec![Direction::Backward, Direction::Forward]);
        assert_eq!(options.max_depth, 3);
        assert!(options.max_duration.is_none());

        config.traversal.directions = vec!["up".into()];
        assert!(BuildOptions::from_config(&config).is_err());
    }

    #[test]
    fn test_stop_handle_shared() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_stopped());
        clone.stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn test_summary_serializes() {
        let mut summary = RunSummary::new(2);
        summary.failed.record(FetchFailureKind::NotFound);
        summary.skipped.record(&SkipReason::NodeBudget);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failed"]["not_found"], 1);
        assert_eq!(json["skipped"]["node_budget"], 1);
        assert_eq!(json["termination"], "frontier_exhausted");
        assert!(!summary.is_complete());
    }
}
