//! Breadth-first frontier expander
//!
//! Each round holds the entries of one depth, in key order. Entries whose
//! key already resolves to a node are settled without a fetch; the rest are
//! fetched concurrently through the fetch cache. Results are committed to
//! the graph one at a time, in entry order, by the single task that owns
//! it, so no locking is needed around graph mutation.

use super::{
    BuildOptions, Direction, EntryState, Frontier, FrontierEntry, RunSummary, SkipReason,
    StopHandle, TerminationReason,
};
use crate::citation::{
    Absorbed, CitationGraph, Committed, EdgeInsert, IdentityResolver, MatchKind, NodeId, Origin,
    SimilarityScorer,
};
use crate::normalize::normalize;
use crate::progress::{ExpansionEvent, ExpansionObserver, ProgressSnapshot};
use chrono::Utc;
use citegraph_common::cache::{FetchCache, Records};
use citegraph_common::errors::{AppError, FetchError, FetchFailureKind, Result};
use citegraph_common::metrics;
use citegraph_common::record::{Identifier, LookupKey, RawRecord};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use validator::Validate;

/// Graph and report produced by a build
#[derive(Debug)]
pub struct BuildOutput {
    pub graph: CitationGraph,
    pub summary: RunSummary,
}

/// Expands seeds into a citation graph
pub struct FrontierExpander {
    fetcher: Arc<FetchCache>,
    resolver: IdentityResolver,
    options: BuildOptions,
    observers: Vec<Arc<dyn ExpansionObserver>>,
    stop: StopHandle,
}

impl FrontierExpander {
    /// Create an expander; fails on invalid options
    pub fn new(fetcher: Arc<FetchCache>, options: BuildOptions) -> Result<Self> {
        options.validate()?;
        let resolver = IdentityResolver::new(
            options.similarity_threshold,
            options.title_weight,
            options.year_tolerance,
        );

        Ok(Self {
            fetcher,
            resolver,
            options,
            observers: Vec::new(),
            stop: StopHandle::new(),
        })
    }

    pub fn with_scorer(mut self, scorer: Box<dyn SimilarityScorer>) -> Self {
        self.resolver = self.resolver.with_scorer(scorer);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExpansionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Build a graph from seeds.
    ///
    /// Fails only when there is no usable seed; per-entry failures are
    /// counted in the summary and the build carries on.
    #[instrument(skip(self, seeds), fields(seeds = seeds.len(), max_depth = self.options.max_depth))]
    pub async fn build(&self, seeds: Vec<LookupKey>) -> Result<BuildOutput> {
        let seeds = dedupe_seeds(seeds);
        if seeds.is_empty() {
            return Err(AppError::NoValidSeeds {
                message: "no identifier or query to start from".to_string(),
            });
        }

        let started = Instant::now();
        let mut run = Run::new(self, seeds.len());

        let mut current = Frontier::new();
        for seed in &seeds {
            for &direction in &self.options.directions {
                current.push(seed.clone(), 0, direction, None);
            }
        }

        let mut depth = 0;
        let stopped_early = loop {
            if current.is_empty() {
                break None;
            }
            let pending = current.len();
            if self.stop.is_stopped() {
                run.summary.truncated += pending;
                break Some(TerminationReason::Cancelled);
            }
            if matches!(self.options.max_duration, Some(limit) if started.elapsed() >= limit) {
                run.summary.truncated += pending;
                break Some(TerminationReason::TimeBudget);
            }
            if run.graph.node_count() >= self.options.max_nodes {
                run.summary.skipped.node_budget += pending;
                break Some(TerminationReason::NodeBudget);
            }

            current = self.expand_round(&mut run, current, depth).await;
            run.summary.rounds += 1;
            metrics::record_graph_size(run.graph.node_count(), run.graph.edge_count());
            depth += 1;
        };

        run.link_deferred();

        let termination = stopped_early.unwrap_or(if run.summary.skipped.node_budget > 0 {
            TerminationReason::NodeBudget
        } else if run.summary.skipped.depth_limit > 0 {
            TerminationReason::DepthLimit
        } else {
            TerminationReason::FrontierExhausted
        });

        Ok(run.finish(termination, &self.fetcher))
    }

    /// Settle every entry of one depth; returns the next depth's frontier.
    ///
    /// Fetches overlap, but results are committed in entry order, so the
    /// graph does not depend on which response arrives first. A pass may
    /// queue follow-up lookups at the same depth; they run as another pass.
    async fn expand_round(&self, run: &mut Run<'_>, current: Frontier, depth: u32) -> Frontier {
        run.emit(ExpansionEvent::RoundStarted {
            depth,
            entries: current.len(),
        });

        let mut next = Frontier::new();
        let mut pass = current;
        let mut remaining = 0;

        while !pass.is_empty() {
            let entries = pass.into_entries();
            remaining += entries.len();
            let mut follow_ups = Frontier::new();
            let mut to_fetch = Vec::new();

            for entry in entries {
                if run.settle_known(&entry, &mut next) {
                    remaining -= 1;
                    run.progress(depth, remaining, &next);
                } else {
                    run.transition(&entry, EntryState::Fetching);
                    to_fetch.push(entry);
                }
            }

            let fetcher = &self.fetcher;
            let mut fetches = stream::iter(to_fetch)
                .map(|entry| async move {
                    let result = fetcher.fetch(&entry.key).await;
                    (entry, result)
                })
                .buffered(self.options.concurrency);

            while let Some((entry, result)) = fetches.next().await {
                run.commit(&entry, result, &mut next, &mut follow_ups);
                remaining -= 1;
                run.progress(depth, remaining, &next);
            }

            pass = follow_ups;
        }

        next
    }

    fn emit(&self, event: ExpansionEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

/// Mutable state of one build, owned by the committing task
struct Run<'a> {
    expander: &'a FrontierExpander,
    graph: CitationGraph,
    visited: HashSet<(NodeId, Direction)>,
    failed: HashSet<LookupKey>,
    /// Neighbors beyond the depth bound, linked once the graph is final
    deferred: Vec<(NodeId, Identifier, Direction)>,
    summary: RunSummary,
    processed: usize,
}

impl<'a> Run<'a> {
    fn new(expander: &'a FrontierExpander, seeds_given: usize) -> Self {
        Self {
            expander,
            graph: CitationGraph::new(),
            visited: HashSet::new(),
            failed: HashSet::new(),
            deferred: Vec::new(),
            summary: RunSummary::new(seeds_given),
            processed: 0,
        }
    }

    fn emit(&self, event: ExpansionEvent) {
        self.expander.emit(event);
    }

    fn transition(&mut self, entry: &FrontierEntry, state: EntryState) {
        match &state {
            EntryState::Resolved { .. } => self.summary.resolved += 1,
            EntryState::Skipped(reason) => self.summary.skipped.record(reason),
            EntryState::Failed { kind } => self.summary.failed.record(*kind),
            EntryState::Pending | EntryState::Fetching => {}
        }
        metrics::record_entry(state.as_str());
        self.emit(ExpansionEvent::Entry {
            key: entry.key.clone(),
            depth: entry.depth,
            direction: entry.direction,
            state,
        });
    }

    fn progress(&mut self, depth: u32, remaining_in_round: usize, next: &Frontier) {
        self.processed += 1;
        self.emit(ExpansionEvent::Progress(ProgressSnapshot {
            depth,
            entries_processed: self.processed,
            entries_remaining_estimate: remaining_in_round + next.len(),
            nodes_so_far: self.graph.node_count(),
        }));
    }

    /// Settle an entry without fetching when its key already resolves to a
    /// node whose citation list for the entry's direction is known.
    fn settle_known(&mut self, entry: &FrontierEntry, next: &mut Frontier) -> bool {
        if self.failed.contains(&entry.key) {
            self.transition(entry, EntryState::Skipped(SkipReason::PreviouslyFailed));
            return true;
        }
        let LookupKey::Id(id) = &entry.key else {
            return false;
        };
        let Some(node) = self.graph.lookup(id) else {
            return false;
        };
        if !self.visited.contains(&(node, entry.direction))
            && self.neighbors(node, entry.direction).is_none()
        {
            return false;
        }
        let state = self.attach(entry, node, next);
        self.transition(entry, state);
        true
    }

    /// Commit the outcome of a fetch. The entry gets one terminal state
    /// however many records the fetch returned.
    fn commit(
        &mut self,
        entry: &FrontierEntry,
        result: std::result::Result<Records, FetchError>,
        next: &mut Frontier,
        follow_ups: &mut Frontier,
    ) {
        let records = match result {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => {
                self.failed.insert(entry.key.clone());
                self.transition(
                    entry,
                    EntryState::Failed {
                        kind: FetchFailureKind::NotFound,
                    },
                );
                return;
            }
            Err(err) => {
                debug!(key = %entry.key, attempts = err.attempts, error = %err.message, "Fetch failed");
                self.failed.insert(entry.key.clone());
                self.transition(entry, EntryState::Failed { kind: err.kind });
                return;
            }
        };

        let mut outcome: Option<EntryState> = None;
        for raw in records.iter() {
            let state = self.commit_record(entry, raw, next, follow_ups);
            outcome = match outcome {
                Some(best) if outcome_rank(&best) >= outcome_rank(&state) => Some(best),
                _ => Some(state),
            };
        }
        if let Some(state) = outcome {
            self.transition(entry, state);
        }
    }

    fn commit_record(
        &mut self,
        entry: &FrontierEntry,
        raw: &RawRecord,
        next: &mut Frontier,
        follow_ups: &mut Frontier,
    ) -> EntryState {
        let mut record = match normalize(raw) {
            Ok(record) => record,
            Err(err) => {
                return EntryState::Skipped(SkipReason::InvalidRecord {
                    message: err.to_string(),
                })
            }
        };

        // The key that fetched the record is one of its identifiers
        if let LookupKey::Id(id) = &entry.key {
            record.identifiers.insert(id.clone());
        }

        let origin = if entry.depth == 0 && entry.parents.is_empty() {
            Origin::Seed
        } else {
            Origin::Discovered
        };
        let max_nodes = self.expander.options.max_nodes;

        let node = match self.expander.resolver.commit(&mut self.graph, record, entry.depth, origin, max_nodes) {
            Committed::Merged { node, via, absorbed } => {
                match via {
                    MatchKind::Identifier => self.summary.matched_by_identifier += 1,
                    MatchKind::Similarity { .. } => self.summary.merged_by_similarity += 1,
                }
                self.expand_absorbed(node, &absorbed, next);
                node
            }
            Committed::Inserted { node } => node,
            Committed::OverBudget => return EntryState::Skipped(SkipReason::NodeBudget),
        };

        // Search hits may lack the list this direction needs; look the
        // work up by identifier before expanding it
        if matches!(entry.key, LookupKey::Query(_)) && self.neighbors(node, entry.direction).is_none() {
            return self.follow_up(entry, node, follow_ups);
        }

        self.attach(entry, node, next)
    }

    /// Queue a lookup of `node` by identifier at the entry's depth
    fn follow_up(&mut self, entry: &FrontierEntry, node: NodeId, follow_ups: &mut Frontier) -> EntryState {
        self.graph.relax_depth(node, entry.depth);
        for &parent in &entry.parents {
            self.link(parent, node, entry.direction);
        }

        let Some(id) = self.graph.get(node).map(|n| n.canonical_id()) else {
            return EntryState::Resolved { node };
        };
        let key = LookupKey::Id(id);
        debug!(node = %node, key = %key, direction = %entry.direction, "Search hit lacks citation list, looking it up");
        if follow_ups.push(key.clone(), entry.depth, entry.direction, None) {
            let lookup = FrontierEntry {
                key,
                depth: entry.depth,
                direction: entry.direction,
                parents: Vec::new(),
            };
            self.transition(&lookup, EntryState::Pending);
        }
        EntryState::Resolved { node }
    }

    /// Connect a resolved entry to its parents and expand it once per
    /// direction; returns the entry's terminal state
    fn attach(&mut self, entry: &FrontierEntry, node: NodeId, next: &mut Frontier) -> EntryState {
        self.graph.relax_depth(node, entry.depth);
        for &parent in &entry.parents {
            self.link(parent, node, entry.direction);
        }

        if !self.visited.insert((node, entry.direction)) {
            return EntryState::Skipped(SkipReason::AlreadyVisited);
        }
        self.expand(node, entry.depth, entry.direction, next);
        EntryState::Resolved { node }
    }

    fn expand(&mut self, node: NodeId, depth: u32, direction: Direction, next: &mut Frontier) {
        let Some(neighbors) = self.neighbors(node, direction).cloned() else {
            debug!(node = %node, direction = %direction, "Citation list unknown, not expanding");
            return;
        };
        self.enqueue(node, depth, direction, neighbors, next);
    }

    /// Expand citation ids a merge added to a node already expanded in
    /// that direction
    fn expand_absorbed(&mut self, node: NodeId, absorbed: &Absorbed, next: &mut Frontier) {
        let Some(depth) = self.graph.get(node).map(|n| n.depth) else {
            return;
        };
        let expander = self.expander;
        for &direction in &expander.options.directions {
            if !self.visited.contains(&(node, direction)) {
                continue;
            }
            let added = match direction {
                Direction::Forward => &absorbed.references,
                Direction::Backward => &absorbed.cited_by,
            };
            if !added.is_empty() {
                debug!(node = %node, direction = %direction, added = added.len(), "Expanding merged citations");
                self.enqueue(node, depth, direction, added.clone(), next);
            }
        }
    }

    fn enqueue(
        &mut self,
        node: NodeId,
        depth: u32,
        direction: Direction,
        neighbors: BTreeSet<Identifier>,
        next: &mut Frontier,
    ) {
        let child_depth = depth + 1;
        let max_depth = self.expander.options.max_depth;

        for id in neighbors {
            if child_depth > max_depth {
                self.deferred.push((node, id, direction));
                continue;
            }
            if let Some(known) = self.graph.lookup(&id) {
                if self.visited.contains(&(known, direction)) {
                    self.link(node, known, direction);
                    continue;
                }
            }

            let key = LookupKey::Id(id);
            if self.failed.contains(&key) {
                self.summary.skipped.previously_failed += 1;
                continue;
            }
            if next.push(key.clone(), child_depth, direction, Some(node)) {
                let entry = FrontierEntry {
                    key,
                    depth: child_depth,
                    direction,
                    parents: vec![node],
                };
                self.transition(&entry, EntryState::Pending);
            }
        }
    }

    /// Add the edge between `from` (the expanded node) and `to` (its neighbor)
    fn link(&mut self, from: NodeId, to: NodeId, direction: Direction) {
        let (citing, cited) = match direction {
            Direction::Forward => (from, to),
            Direction::Backward => (to, from),
        };
        if self.graph.add_edge(citing, cited) == EdgeInsert::SelfLoop {
            self.summary.self_loops_rejected += 1;
            debug!(node = %citing, "Rejected self-citation");
        }
    }

    /// Link neighbors found past the depth bound to nodes that made it in
    fn link_deferred(&mut self) {
        for (node, id, direction) in std::mem::take(&mut self.deferred) {
            match self.graph.lookup(&id) {
                Some(known) => self.link(node, known, direction),
                None => self.summary.skipped.depth_limit += 1,
            }
        }
    }

    fn neighbors(&self, node: NodeId, direction: Direction) -> Option<&BTreeSet<Identifier>> {
        let record = &self.graph.get(node)?.record;
        match direction {
            Direction::Forward => record.references.as_ref(),
            Direction::Backward => record.cited_by.as_ref(),
        }
    }

    fn finish(mut self, termination: TerminationReason, fetcher: &FetchCache) -> BuildOutput {
        self.summary.termination = termination;
        self.summary.finished_at = Some(Utc::now());
        self.summary.seeds_resolved = self.graph.seed_count();
        self.summary.nodes = self.graph.node_count();
        self.summary.edges = self.graph.edge_count();
        self.summary.fetch = fetcher.stats();

        self.emit(ExpansionEvent::Finished {
            termination,
            nodes: self.summary.nodes,
            edges: self.summary.edges,
        });
        info!(
            run_id = %self.summary.run_id,
            nodes = self.summary.nodes,
            edges = self.summary.edges,
            rounds = self.summary.rounds,
            failed = self.summary.failed.total(),
            skipped = self.summary.skipped.total(),
            termination = termination.as_str(),
            "Build complete"
        );

        BuildOutput {
            graph: self.graph,
            summary: self.summary,
        }
    }
}

/// Preference among the states of one entry's records
fn outcome_rank(state: &EntryState) -> u8 {
    match state {
        EntryState::Resolved { .. } => 3,
        EntryState::Skipped(SkipReason::AlreadyVisited) => 2,
        EntryState::Skipped(_) => 1,
        _ => 0,
    }
}

/// Drop blank queries and repeated seeds, keeping first-seen order
fn dedupe_seeds(seeds: Vec<LookupKey>) -> Vec<LookupKey> {
    let mut seen = HashSet::new();
    seeds
        .into_iter()
        .filter_map(|seed| match seed {
            LookupKey::Query(q) => {
                let q = q.trim().to_string();
                (!q.is_empty()).then_some(LookupKey::Query(q))
            }
            id => Some(id),
        })
        .filter(|seed| seen.insert(seed.clone()))
        .collect()
}
