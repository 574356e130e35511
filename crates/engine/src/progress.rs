//! Progress reporting
//!
//! The expander publishes [`ExpansionEvent`]s to any number of observers.
//! Observers are called inline from the committing task and must not block.

use crate::frontier::{Direction, EntryState, TerminationReason};
use citegraph_common::record::LookupKey;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Point-in-time progress counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub depth: u32,
    pub entries_processed: usize,
    /// Entries left in this round plus entries already queued for the next
    pub entries_remaining_estimate: usize,
    pub nodes_so_far: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExpansionEvent {
    RoundStarted {
        depth: u32,
        entries: usize,
    },
    Entry {
        key: LookupKey,
        depth: u32,
        direction: Direction,
        state: EntryState,
    },
    Progress(ProgressSnapshot),
    Finished {
        termination: TerminationReason,
        nodes: usize,
        edges: usize,
    },
}

/// Receiver of expansion events
pub trait ExpansionObserver: Send + Sync {
    fn on_event(&self, event: &ExpansionEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExpansionObserver for TracingObserver {
    fn on_event(&self, event: &ExpansionEvent) {
        match event {
            ExpansionEvent::RoundStarted { depth, entries } => {
                info!(depth, entries, "Expanding round");
            }
            ExpansionEvent::Entry {
                key,
                depth,
                direction,
                state,
            } => match state {
                EntryState::Failed { kind } => {
                    warn!(key = %key, depth, direction = %direction, kind = ?kind, "Entry failed");
                }
                EntryState::Pending | EntryState::Fetching => {
                    trace!(key = %key, depth, state = state.as_str(), "Entry");
                }
                _ => debug!(key = %key, depth, direction = %direction, state = ?state, "Entry settled"),
            },
            ExpansionEvent::Progress(snapshot) => {
                trace!(
                    processed = snapshot.entries_processed,
                    remaining = snapshot.entries_remaining_estimate,
                    nodes = snapshot.nodes_so_far,
                    "Progress"
                );
            }
            ExpansionEvent::Finished {
                termination,
                nodes,
                edges,
            } => {
                info!(termination = termination.as_str(), nodes, edges, "Expansion finished");
            }
        }
    }
}

/// Forwards events to an unbounded channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ExpansionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExpansionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ExpansionObserver for ChannelObserver {
    fn on_event(&self, event: &ExpansionEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ExpansionEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExpansionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest progress snapshot seen
    pub fn last_progress(&self) -> Option<ProgressSnapshot> {
        self.events().into_iter().rev().find_map(|e| match e {
            ExpansionEvent::Progress(snapshot) => Some(snapshot),
            _ => None,
        })
    }
}

impl ExpansionObserver for RecordingObserver {
    fn on_event(&self, event: &ExpansionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_observer_forwards() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_event(&ExpansionEvent::RoundStarted { depth: 0, entries: 3 });
        drop(observer);

        match rx.recv().await {
            Some(ExpansionEvent::RoundStarted { depth, entries }) => {
                assert_eq!(depth, 0);
                assert_eq!(entries, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_recording_observer_last_progress() {
        let observer = RecordingObserver::new();
        for processed in 1..=3 {
            observer.on_event(&ExpansionEvent::Progress(ProgressSnapshot {
                depth: 0,
                entries_processed: processed,
                entries_remaining_estimate: 3 - processed,
                nodes_so_far: processed,
            }));
        }
        assert_eq!(observer.events().len(), 3);
        assert_eq!(observer.last_progress().unwrap().entries_processed, 3);
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let event = ExpansionEvent::Finished {
            termination: TerminationReason::NodeBudget,
            nodes: 5,
            edges: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["termination"], "node_budget");
    }
}
